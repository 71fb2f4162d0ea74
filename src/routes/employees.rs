use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};

use crate::{
    dto::employees::{CreateEmployeeRequest, EmployeeDetail, EmployeeList, UpdateEmployeeRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::SearchQuery,
    services::employee_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_employees).post(create_employee))
        .route(
            "/{id}",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
}

#[utoipa::path(
    get,
    path = "/api/employees",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("q" = Option<String>, Query, description = "Search username, email or name")
    ),
    responses(
        (status = 200, description = "Back-office accounts", body = ApiResponse<EmployeeList>),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn list_employees(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<EmployeeList>>> {
    let resp = employee_service::list_employees(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/employees/{id}",
    params(("id" = i64, Path, description = "User ID of the employee")),
    responses(
        (status = 200, description = "Employee", body = ApiResponse<EmployeeDetail>),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn get_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<EmployeeDetail>>> {
    let resp = employee_service::get_employee(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployeeRequest,
    responses(
        (status = 201, description = "Employee created", body = ApiResponse<EmployeeDetail>),
        (status = 409, description = "Username or email already taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn create_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateEmployeeRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<EmployeeDetail>>)> {
    let resp = employee_service::create_employee(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/employees/{id}",
    params(("id" = i64, Path, description = "User ID of the employee")),
    request_body = UpdateEmployeeRequest,
    responses(
        (status = 200, description = "Employee updated", body = ApiResponse<EmployeeDetail>),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn update_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateEmployeeRequest>,
) -> AppResult<Json<ApiResponse<EmployeeDetail>>> {
    let resp = employee_service::update_employee(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/employees/{id}",
    params(("id" = i64, Path, description = "User ID of the employee")),
    responses(
        (status = 200, description = "Employee deleted"),
        (status = 400, description = "Cannot delete yourself"),
        (status = 409, description = "Employee has orders")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn delete_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = employee_service::delete_employee(&state, &user, id).await?;
    Ok(Json(resp))
}
