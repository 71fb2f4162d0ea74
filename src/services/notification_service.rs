use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::{
    dto::notifications::{NotificationList, UnreadCount},
    entity::{
        notifications::{ActiveModel, Column, Entity as Notifications, Model as NotificationModel},
        sea_orm_active_enums::NotificationType,
    },
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, policy::Action},
    models::Notification,
    response::ApiResponse,
    routes::params::NotificationQuery,
    state::AppState,
};

/// Append a notification. `user_id: None` addresses the back office as a whole.
///
/// Runs on whatever connection the caller holds so it commits or rolls back with
/// the state change it reports.
pub async fn notify<C: ConnectionTrait>(
    conn: &C,
    user_id: Option<i64>,
    kind: NotificationType,
    order_id: Option<i64>,
    message: String,
) -> Result<NotificationModel, DbErr> {
    ActiveModel {
        id: NotSet,
        user_id: Set(user_id),
        kind: Set(kind),
        order_id: Set(order_id),
        message: Set(message),
        is_read: Set(false),
        created_at: NotSet,
    }
    .insert(conn)
    .await
}

/// Rows the user may see: their own plus broadcasts when their role reads them.
fn visible_to(user: &AuthUser) -> Condition {
    let mut condition = Condition::any().add(Column::UserId.eq(user.user_id));
    if user.can(Action::ReadBroadcasts) {
        condition = condition.add(Column::UserId.is_null());
    }
    condition
}

pub async fn list_notifications(
    state: &AppState,
    user: &AuthUser,
    query: NotificationQuery,
) -> AppResult<ApiResponse<NotificationList>> {
    let page = query.page();
    let mut condition = Condition::all().add(visible_to(user));
    if query.unread_only.unwrap_or(false) {
        condition = condition.add(Column::IsRead.eq(false));
    }

    let finder = Notifications::find()
        .filter(condition)
        .order_by_desc(Column::CreatedAt)
        .order_by_desc(Column::Id);

    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(page.limit())
        .offset(page.offset())
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Notification::from)
        .collect();

    Ok(ApiResponse::paged(
        "Notifications",
        NotificationList { items },
        &page,
        total,
    ))
}

pub async fn unread_count(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<UnreadCount>> {
    let unread = Notifications::find()
        .filter(
            Condition::all()
                .add(visible_to(user))
                .add(Column::IsRead.eq(false)),
        )
        .count(&state.orm)
        .await?;
    Ok(ApiResponse::ok("OK", UnreadCount { unread }))
}

pub async fn mark_read(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<Notification>> {
    // Someone else's notification is reported as missing.
    let existing = Notifications::find_by_id(id)
        .filter(visible_to(user))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Notification not found"))?;

    if existing.is_read {
        return Ok(ApiResponse::ok("Notification updated", existing.into()));
    }

    let mut active: ActiveModel = existing.into();
    active.is_read = Set(true);
    let updated = active.update(&state.orm).await?;
    Ok(ApiResponse::ok("Notification updated", updated.into()))
}

pub async fn mark_all_read(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Notifications::update_many()
        .col_expr(Column::IsRead, Expr::value(true))
        .filter(
            Condition::all()
                .add(visible_to(user))
                .add(Column::IsRead.eq(false)),
        )
        .exec(&state.orm)
        .await?;

    tracing::debug!(user_id = user.user_id, updated = result.rows_affected, "notifications marked read");
    Ok(ApiResponse::ok(
        "Notifications updated",
        serde_json::json!({ "updated": result.rows_affected }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::sea_orm_active_enums::UserRole;
    use sea_orm::{DbBackend, QueryTrait};

    fn sql_for(role: UserRole) -> String {
        let user = AuthUser { user_id: 7, role };
        Notifications::find()
            .filter(visible_to(&user))
            .build(DbBackend::Postgres)
            .to_string()
    }

    #[test]
    fn customers_only_see_their_own_rows() {
        let sql = sql_for(UserRole::Customer);
        assert!(sql.contains("= 7"), "{sql}");
        assert!(!sql.contains("IS NULL"), "{sql}");
    }

    #[test]
    fn back_office_also_sees_broadcasts() {
        for role in [UserRole::Employee, UserRole::Staff, UserRole::Admin] {
            let sql = sql_for(role);
            assert!(sql.contains("= 7"), "{sql}");
            assert!(sql.contains("IS NULL"), "{sql}");
        }
    }
}
