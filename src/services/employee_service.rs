use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use validator::Validate;

use crate::{
    dto::employees::{CreateEmployeeRequest, EmployeeDetail, EmployeeList, UpdateEmployeeRequest},
    entity::{
        employees::{
            ActiveModel as EmployeeActive, Column as EmployeeCol, Entity as Employees,
            Model as EmployeeModel,
        },
        orders::{Column as OrderCol, Entity as Orders},
        sea_orm_active_enums::{UserRole, UserStatus},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, policy::Action},
    response::ApiResponse,
    routes::params::{SearchQuery, search_term},
    services::auth_service::{conflict_on_duplicate, ensure_identity_free, hash_password},
    state::AppState,
};

const EMPLOYEE_ROLES: [UserRole; 3] = [UserRole::Employee, UserRole::Staff, UserRole::Admin];

fn detail(user: UserModel, employee: Option<EmployeeModel>) -> EmployeeDetail {
    EmployeeDetail {
        user: user.into(),
        employee: employee.map(Into::into),
    }
}

fn ensure_employee_role(role: UserRole) -> AppResult<()> {
    if !role.is_employee_role() {
        return Err(AppError::BadRequest(
            "role must be one of employee, staff or admin".into(),
        ));
    }
    Ok(())
}

async fn find_employee<C: ConnectionTrait>(
    conn: &C,
    user_id: i64,
) -> AppResult<(UserModel, Option<EmployeeModel>)> {
    Users::find_by_id(user_id)
        .filter(UserCol::Role.is_in(EMPLOYEE_ROLES))
        .find_also_related(Employees)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Employee not found"))
}

pub async fn list_employees(
    state: &AppState,
    user: &AuthUser,
    query: SearchQuery,
) -> AppResult<ApiResponse<EmployeeList>> {
    user.require(Action::ManageEmployees)?;
    let page = query.page();

    let mut condition = Condition::all().add(UserCol::Role.is_in(EMPLOYEE_ROLES));
    if let Some(search) = search_term(query.q.as_ref()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col((Users, UserCol::Username)).ilike(pattern.clone()))
                .add(Expr::col((Users, UserCol::Email)).ilike(pattern.clone()))
                .add(Expr::col((Employees, EmployeeCol::Name)).ilike(pattern)),
        );
    }

    let finder = Users::find()
        .find_also_related(Employees)
        .filter(condition)
        .order_by_asc(UserCol::Id);

    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(page.limit())
        .offset(page.offset())
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|(user, employee)| detail(user, employee))
        .collect();

    Ok(ApiResponse::paged("Employees", EmployeeList { items }, &page, total))
}

pub async fn get_employee(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<EmployeeDetail>> {
    user.require(Action::ManageEmployees)?;
    let (account, employee) = find_employee(&state.orm, id).await?;
    Ok(ApiResponse::ok("Employee", detail(account, employee)))
}

pub async fn create_employee(
    state: &AppState,
    user: &AuthUser,
    payload: CreateEmployeeRequest,
) -> AppResult<ApiResponse<EmployeeDetail>> {
    user.require(Action::ManageEmployees)?;
    payload.validate()?;
    ensure_employee_role(payload.role)?;
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    let txn = state.orm.begin().await?;
    ensure_identity_free(&txn, Some(&username), Some(&email), None).await?;

    let account = UserActive {
        id: NotSet,
        username: Set(username),
        email: Set(email),
        password_hash: Set(hash_password(&payload.password)?),
        role: Set(payload.role),
        status: Set(UserStatus::Active),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await
    .map_err(conflict_on_duplicate)?;

    let employee = EmployeeActive {
        id: NotSet,
        user_id: Set(account.id),
        name: Set(payload.name.trim().to_string()),
        phone: Set(payload.phone),
        position: Set(payload.position),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    tracing::info!(user_id = account.id, role = ?account.role, by = user.user_id, "employee created");

    Ok(ApiResponse::ok("Employee created", detail(account, Some(employee))))
}

pub async fn update_employee(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateEmployeeRequest,
) -> AppResult<ApiResponse<EmployeeDetail>> {
    user.require(Action::ManageEmployees)?;
    payload.validate()?;
    if let Some(role) = payload.role {
        ensure_employee_role(role)?;
    }

    let txn = state.orm.begin().await?;
    let (account, employee) = find_employee(&txn, id).await?;

    let account = if payload.role.is_some() || payload.status.is_some() {
        let mut active: UserActive = account.into();
        if let Some(role) = payload.role {
            active.role = Set(role);
        }
        if let Some(status) = payload.status {
            active.status = Set(status);
        }
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?
    } else {
        account
    };

    let employee = match employee {
        Some(existing) => {
            let mut active: EmployeeActive = existing.into();
            if let Some(name) = payload.name {
                active.name = Set(name.trim().to_string());
            }
            if let Some(phone) = payload.phone {
                active.phone = Set(Some(phone));
            }
            if let Some(position) = payload.position {
                active.position = Set(Some(position));
            }
            active.update(&txn).await?
        }
        // Back-office accounts seeded without a profile get one on first edit.
        None => {
            EmployeeActive {
                id: NotSet,
                user_id: Set(account.id),
                name: Set(payload
                    .name
                    .map(|n| n.trim().to_string())
                    .unwrap_or_else(|| account.username.clone())),
                phone: Set(payload.phone),
                position: Set(payload.position),
            }
            .insert(&txn)
            .await?
        }
    };

    txn.commit().await?;
    tracing::info!(user_id = account.id, by = user.user_id, "employee updated");

    Ok(ApiResponse::ok("Employee updated", detail(account, Some(employee))))
}

pub async fn delete_employee(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    user.require(Action::ManageEmployees)?;
    if id == user.user_id {
        return Err(AppError::BadRequest("You cannot delete your own account".into()));
    }

    let (account, _) = find_employee(&state.orm, id).await?;

    // Orders cascade with their user; deleting them here would leak reserved stock.
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(account.id))
        .count(&state.orm)
        .await?;
    if orders > 0 {
        return Err(AppError::Conflict(
            "Employee has orders on record, deactivate the account instead".into(),
        ));
    }

    Users::delete_by_id(account.id).exec(&state.orm).await?;

    tracing::info!(user_id = id, by = user.user_id, "employee deleted");
    Ok(ApiResponse::ok("Employee deleted", serde_json::json!({ "id": id })))
}
