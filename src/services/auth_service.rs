use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    Set, SqlErr, TransactionTrait,
};
use secrecy::ExposeSecret;
use validator::Validate;

use crate::{
    config::AppConfig,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest},
    entity::{
        customers::ActiveModel as CustomerActive,
        sea_orm_active_enums::{UserRole, UserStatus},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    models::User,
    response::ApiResponse,
    state::AppState,
};

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn issue_token(config: &AppConfig, user: &UserModel) -> AppResult<(String, i64)> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(config.jwt_ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role,
        exp: expiration.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.expose_secret().as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    Ok((token, expiration.timestamp()))
}

/// Reject a username or email already held by another user.
pub async fn ensure_identity_free<C: ConnectionTrait>(
    conn: &C,
    username: Option<&str>,
    email: Option<&str>,
    except_user: Option<i64>,
) -> AppResult<()> {
    if let Some(username) = username {
        let mut finder = Users::find().filter(UserCol::Username.eq(username));
        if let Some(id) = except_user {
            finder = finder.filter(UserCol::Id.ne(id));
        }
        if finder.one(conn).await?.is_some() {
            return Err(AppError::Conflict("Username is already taken".into()));
        }
    }
    if let Some(email) = email {
        let mut finder = Users::find().filter(UserCol::Email.eq(email));
        if let Some(id) = except_user {
            finder = finder.filter(UserCol::Id.ne(id));
        }
        if finder.one(conn).await?.is_some() {
            return Err(AppError::Conflict("Email is already taken".into()));
        }
    }
    Ok(())
}

/// Map a unique-constraint race on the users table to a 409.
pub fn conflict_on_duplicate(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Username or email is already taken".into())
        }
        _ => AppError::OrmError(err),
    }
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    payload.validate()?;
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    let txn = state.orm.begin().await?;
    ensure_identity_free(&txn, Some(&username), Some(&email), None).await?;

    let password_hash = hash_password(&payload.password)?;
    let user = UserActive {
        id: NotSet,
        username: Set(username),
        email: Set(email),
        password_hash: Set(password_hash),
        role: Set(UserRole::Customer),
        status: Set(UserStatus::Active),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await
    .map_err(conflict_on_duplicate)?;

    CustomerActive {
        id: NotSet,
        user_id: Set(user.id),
        name: Set(payload.name.trim().to_string()),
        phone: Set(payload.phone),
        address: Set(payload.address),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    tracing::info!(user_id = user.id, "user registered");

    Ok(ApiResponse::ok("User created", user.into()))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    payload.validate()?;
    let login = payload.login.trim();

    let user = Users::find()
        .filter(
            Condition::any()
                .add(UserCol::Username.eq(login))
                .add(UserCol::Email.eq(login.to_lowercase())),
        )
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid credentials".into()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        tracing::debug!(user_id = user.id, "login rejected, wrong password");
        return Err(AppError::BadRequest("Invalid credentials".into()));
    }

    if user.status != UserStatus::Active {
        tracing::debug!(user_id = user.id, "login rejected, account inactive");
        return Err(AppError::Forbidden);
    }

    let (token, expires_at) = issue_token(&state.config, &user)?;
    tracing::info!(user_id = user.id, role = ?user.role, "user logged in");

    Ok(ApiResponse::ok(
        "Logged in",
        LoginResponse {
            token,
            token_type: "Bearer".into(),
            expires_at,
            user: user.into(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::DbConfig, middleware::auth::decode_token};
    use chrono::FixedOffset;
    use secrecy::SecretString;

    fn config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/unused".into(),
            host: "127.0.0.1".into(),
            port: 0,
            jwt_secret: SecretString::from("test-secret".to_string()),
            jwt_ttl_hours: 2,
            db: DbConfig::default(),
            max_body_bytes: 1024,
            concurrency_limit: 8,
            storage: None,
            mail: None,
        }
    }

    fn user() -> UserModel {
        let now = Utc::now().with_timezone(&FixedOffset::east_opt(0).expect("utc offset"));
        UserModel {
            id: 12,
            username: "ada".into(),
            email: "ada@example.com".into(),
            password_hash: String::new(),
            role: UserRole::Staff,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(verify_password("correct horse", &hash).expect("verify"));
        assert!(!verify_password("battery staple", &hash).expect("verify"));
    }

    #[test]
    fn issued_token_carries_subject_and_role() {
        let config = config();
        let (token, expires_at) = issue_token(&config, &user()).expect("token");
        let claims = decode_token(&token, b"test-secret").expect("claims");
        assert_eq!(claims.sub, "12");
        assert_eq!(claims.role, UserRole::Staff);
        assert_eq!(claims.exp as i64, expires_at);
        assert!(expires_at > Utc::now().timestamp() + 3600);
    }
}
