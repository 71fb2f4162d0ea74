use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use validator::Validate;

use crate::{
    dto::profile::{ChangePasswordRequest, Profile, UpdateProfileRequest},
    entity::{
        customers::{ActiveModel as CustomerActive, Column as CustomerCol, Entity as Customers},
        users::{ActiveModel as UserActive, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::auth_service::{
        conflict_on_duplicate, ensure_identity_free, hash_password, verify_password,
    },
    state::AppState,
};

async fn current_user(state: &AppState, user: &AuthUser) -> AppResult<UserModel> {
    Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Profile>> {
    let account = current_user(state, user).await?;
    let customer = Customers::find()
        .filter(CustomerCol::UserId.eq(account.id))
        .one(&state.orm)
        .await?;

    Ok(ApiResponse::ok(
        "Profile",
        Profile {
            user: account.into(),
            customer: customer.map(Into::into),
        },
    ))
}

/// Account and customer details change together or not at all.
pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<Profile>> {
    payload.validate()?;
    let username = payload.username.as_deref().map(str::trim);
    let email = payload.email.as_deref().map(|e| e.trim().to_lowercase());

    let txn = state.orm.begin().await?;
    let account = Users::find_by_id(user.user_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    ensure_identity_free(&txn, username, email.as_deref(), Some(account.id)).await?;

    let mut active: UserActive = account.into();
    if let Some(username) = username {
        active.username = Set(username.to_string());
    }
    if let Some(email) = email {
        active.email = Set(email);
    }
    active.updated_at = Set(Utc::now().into());
    let account = active.update(&txn).await.map_err(conflict_on_duplicate)?;

    let existing = Customers::find()
        .filter(CustomerCol::UserId.eq(account.id))
        .one(&txn)
        .await?;
    let customer = match existing {
        Some(customer) => {
            let mut active: CustomerActive = customer.into();
            if let Some(name) = payload.name {
                active.name = Set(name.trim().to_string());
            }
            if let Some(phone) = payload.phone {
                active.phone = Set(Some(phone));
            }
            if let Some(address) = payload.address {
                active.address = Set(Some(address));
            }
            Some(active.update(&txn).await?)
        }
        // Only create a customer profile when there is something to put in it.
        None if payload.name.is_some() => Some(
            CustomerActive {
                id: NotSet,
                user_id: Set(account.id),
                name: Set(payload.name.unwrap_or_default().trim().to_string()),
                phone: Set(payload.phone),
                address: Set(payload.address),
            }
            .insert(&txn)
            .await?,
        ),
        None => None,
    };

    txn.commit().await?;
    tracing::info!(user_id = account.id, "profile updated");

    Ok(ApiResponse::ok(
        "Profile updated",
        Profile {
            user: account.into(),
            customer: customer.map(Into::into),
        },
    ))
}

pub async fn change_password(
    state: &AppState,
    user: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    payload.validate()?;
    let account = current_user(state, user).await?;

    if !verify_password(&payload.current_password, &account.password_hash)? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    let mut active: UserActive = account.into();
    active.password_hash = Set(hash_password(&payload.new_password)?);
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    tracing::info!(user_id = user.user_id, "password changed");
    Ok(ApiResponse::ok("Password updated", serde_json::json!({})))
}
