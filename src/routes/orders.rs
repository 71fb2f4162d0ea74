use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
};

use crate::{
    dto::orders::{
        FileUploadForm, OrderList, OrderWithItems, PlaceOrderForm, PlacedOrder,
        UpdateOrderStatusRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Order,
    response::ApiResponse,
    routes::{params::OrderListQuery, upload},
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(place_order))
        .route("/user/{user_id}", get(list_user_orders))
        .route("/delete/{id}", delete(delete_order))
        .route("/{id}", get(get_order))
        .route("/{id}/status", put(update_order_status))
        .route("/{id}/cancel", put(cancel_order))
        .route("/{id}/shipping-bill", put(upload_shipping_bill))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body(content = PlaceOrderForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Order placed, stock reserved", body = ApiResponse<PlacedOrder>),
        (status = 400, description = "Malformed form, validation failure or insufficient stock"),
        (status = 404, description = "A referenced product does not exist")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<PlacedOrder>>)> {
    let request = upload::order_form(multipart, user.user_id).await?;
    let resp = order_service::place_order(&state, &user, request).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "pending | paid | shipped | completed | cancelled"),
        ("payment_type" = Option<String>, Query, description = "Exact payment type"),
        ("date_from" = Option<String>, Query, description = "YYYY-MM-DD, inclusive"),
        ("date_to" = Option<String>, Query, description = "YYYY-MM-DD, inclusive"),
        ("search" = Option<String>, Query, description = "Matches shipping name, email or phone"),
        ("sort_order" = Option<String>, Query, description = "asc | desc by creation time")
    ),
    responses(
        (status = 200, description = "All orders", body = ApiResponse<OrderList>),
        (status = 403, description = "Back-office only")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/user/{user_id}",
    params(
        ("user_id" = i64, Path, description = "Owner of the orders"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("sort_order" = Option<String>, Query, description = "asc | desc by creation time")
    ),
    responses(
        (status = 200, description = "Orders of one user", body = ApiResponse<OrderList>),
        (status = 403, description = "Not the owner")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_user_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_user_orders(&state, &user, user_id, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = i64, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with its lines", body = ApiResponse<OrderWithItems>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/status",
    params(("id" = i64, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<Order>),
        (status = 400, description = "Cancelled orders cannot be reopened"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = order_service::update_order_status(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/cancel",
    params(("id" = i64, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled, stock restored", body = ApiResponse<Order>),
        (status = 400, description = "Order is not pending"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = order_service::cancel_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/shipping-bill",
    params(("id" = i64, Path, description = "Order ID")),
    request_body(content = FileUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Shipping bill attached", body = ApiResponse<Order>),
        (status = 404, description = "Order not found"),
        (status = 500, description = "Upload failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn upload_shipping_bill(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Order>>> {
    let file = upload::single_file(multipart, "file").await?;
    let resp = order_service::upload_shipping_bill(&state, &user, id, file).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/orders/delete/{id}",
    params(("id" = i64, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order deleted"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = order_service::delete_order(&state, &user, id).await?;
    Ok(Json(resp))
}
