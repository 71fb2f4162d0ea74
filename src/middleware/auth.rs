use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use secrecy::ExposeSecret;

use crate::{
    dto::auth::Claims,
    entity::sea_orm_active_enums::UserRole,
    error::AppError,
    middleware::policy::{self, Action},
    state::AppState,
};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: UserRole,
}

impl AuthUser {
    pub fn can(&self, action: Action) -> bool {
        policy::is_allowed(self.role, action)
    }

    pub fn require(&self, action: Action) -> Result<(), AppError> {
        if !self.can(action) {
            tracing::debug!(user_id = self.user_id, role = ?self.role, ?action, "access denied");
            return Err(AppError::Forbidden);
        }
        Ok(())
    }

    /// Allow the owner of a resource, or anyone the policy grants `action`.
    pub fn require_owner_or(&self, owner_id: i64, action: Action) -> Result<(), AppError> {
        if self.user_id == owner_id {
            return Ok(());
        }
        self.require(action)
    }
}

pub fn decode_token(token: &str, secret: &[u8]) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Forbidden)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // No usable bearer credential is a 401, a bad one is a 403.
        let auth_str = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        let claims = decode_token(token, state.config.jwt_secret.expose_secret().as_bytes())?;

        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Forbidden)?;

        Ok(AuthUser {
            user_id,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str, exp: i64) -> String {
        let claims = Claims {
            sub: "7".into(),
            role: UserRole::Staff,
            exp: exp as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("encode token")
    }

    #[test]
    fn valid_token_round_trips_claims() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let claims = decode_token(&token("s3cret", exp), b"s3cret").expect("valid token");
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.role, UserRole::Staff);
    }

    #[test]
    fn wrong_secret_is_forbidden() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let err = decode_token(&token("s3cret", exp), b"other").unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[test]
    fn expired_token_is_forbidden() {
        let exp = chrono::Utc::now().timestamp() - 3600;
        let err = decode_token(&token("s3cret", exp), b"s3cret").unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[test]
    fn owner_passes_without_permission() {
        let user = AuthUser {
            user_id: 3,
            role: UserRole::Customer,
        };
        assert!(user.require_owner_or(3, Action::CancelAnyOrder).is_ok());
        assert!(matches!(
            user.require_owner_or(4, Action::CancelAnyOrder),
            Err(AppError::Forbidden)
        ));
    }
}
