use std::collections::HashMap;

use chrono::{NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use validator::Validate;

use crate::{
    dto::{
        max_amount,
        orders::{OrderList, OrderWithItems, PlaceOrderRequest, PlacedOrder, UpdateOrderStatusRequest},
    },
    entity::{
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products},
        sea_orm_active_enums::{NotificationType, OrderStatus},
    },
    error::{AppError, AppResult},
    mailer::order_confirmation,
    middleware::{auth::AuthUser, policy::Action},
    models::{Order, OrderItem},
    response::ApiResponse,
    routes::params::{OrderListQuery, SortOrder, search_term},
    services::notification_service::notify,
    state::AppState,
    storage::UploadedFile,
};

/// Place an order atomically: every line is checked against locked stock, stock is
/// decremented, the total is derived from the stored lines and both the admin and
/// the customer are notified. Nothing is persisted unless every line succeeds.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    mut request: PlaceOrderRequest,
) -> AppResult<ApiResponse<PlacedOrder>> {
    user.require(Action::PlaceOrder)?;
    request.validate()?;
    ensure_storable_total(
        request
            .items
            .iter()
            .map(|line| line.price * Decimal::from(line.quantity))
            .sum(),
    )?;

    // A failed proof upload never blocks the order.
    let payment_proof = match request.payment_proof.take() {
        Some(file) => match state.storage.upload("payment_proofs", file).await {
            Ok(stored) => Some(stored.url),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    user_id = request.user_id,
                    "payment proof upload failed, placing order without it"
                );
                None
            }
        },
        None => None,
    };

    let txn = state.orm.begin().await?;

    let order = OrderActive {
        id: NotSet,
        user_id: Set(request.user_id),
        shipping_name: Set(request.shipping.name.trim().to_string()),
        shipping_address: Set(request.shipping.address.trim().to_string()),
        shipping_phone: Set(request.shipping.phone.trim().to_string()),
        shipping_email: Set(request.shipping.email.trim().to_string()),
        status: Set(OrderStatus::Pending),
        payment_type: Set(request.payment_type.trim().to_string()),
        payment_proof: Set(payment_proof),
        shipping_bill_url: Set(None),
        total: Set(Decimal::ZERO),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    // Lock every referenced product in id order so concurrent orders cannot deadlock.
    let mut product_ids: Vec<i64> = request.items.iter().map(|i| i.product_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();
    let mut products: HashMap<i64, _> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .order_by_asc(ProdCol::Id)
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut items: Vec<OrderItem> = Vec::with_capacity(request.items.len());
    for line in &request.items {
        let product = products
            .get_mut(&line.product_id)
            .ok_or_else(|| AppError::not_found(format!("Product {} not found", line.product_id)))?;

        if line.quantity > product.stock_quantity {
            return Err(AppError::InsufficientStock {
                product_id: product.id,
                product: product.name.clone(),
                available: product.stock_quantity,
                requested: line.quantity,
            });
        }
        product.stock_quantity -= line.quantity;

        let item = OrderItemActive {
            id: NotSet,
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            price: Set(line.price),
        }
        .insert(&txn)
        .await?;

        Products::update_many()
            .col_expr(
                ProdCol::StockQuantity,
                Expr::col(ProdCol::StockQuantity).sub(line.quantity),
            )
            .col_expr(ProdCol::UpdatedAt, Expr::current_timestamp().into())
            .filter(ProdCol::Id.eq(line.product_id))
            .exec(&txn)
            .await?;

        items.push(OrderItem::from_entity(item, Some(product.name.clone())));
    }

    let total = order_total(&items);
    let mut active: OrderActive = order.into();
    active.total = Set(total);
    let order = active.update(&txn).await?;

    notify(
        &txn,
        None,
        NotificationType::NewOrder,
        Some(order.id),
        format!(
            "New order #{} from {} totalling {}",
            order.id, order.shipping_name, order.total
        ),
    )
    .await?;
    notify(
        &txn,
        Some(order.user_id),
        NotificationType::OrderPlaced,
        Some(order.id),
        format!("Your order #{} has been placed and is awaiting payment", order.id),
    )
    .await?;

    txn.commit().await?;

    tracing::info!(
        order_id = order.id,
        user_id = order.user_id,
        lines = items.len(),
        total = %order.total,
        "order placed"
    );

    let order = Order::from(order);
    if let Err(err) = state.mailer.send(order_confirmation(&order)).await {
        tracing::warn!(error = %err, order_id = order.id, "order confirmation email failed");
    }

    Ok(ApiResponse::ok(
        "Order placed",
        PlacedOrder {
            order_id: order.id,
            order,
            items,
        },
    ))
}

/// Customer self-service cancellation of a pending order; stock is returned.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;

    let order = lock_order(&txn, id).await?;
    user.require_owner_or(order.user_id, Action::CancelAnyOrder)?;

    if order.status != OrderStatus::Pending {
        return Err(AppError::BadRequest(format!(
            "Order is not cancellable (status: {})",
            order.status
        )));
    }

    let order = set_status(&txn, order, OrderStatus::Cancelled).await?;
    restock_items(&txn, order.id).await?;

    notify(
        &txn,
        None,
        NotificationType::OrderCancelled,
        Some(order.id),
        format!("Order #{} was cancelled", order.id),
    )
    .await?;
    notify(
        &txn,
        Some(order.user_id),
        NotificationType::OrderCancelled,
        Some(order.id),
        format!("Your order #{} has been cancelled", order.id),
    )
    .await?;

    txn.commit().await?;
    tracing::info!(order_id = order.id, by = user.user_id, "order cancelled");

    Ok(ApiResponse::ok("Order cancelled", order.into()))
}

/// Back-office status change. Moving an order into `cancelled` returns its stock,
/// and a cancelled order can never be reopened.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    user.require(Action::UpdateOrderStatus)?;
    let target = payload.status;

    let txn = state.orm.begin().await?;
    let order = lock_order(&txn, id).await?;
    let previous = order.status;

    if previous == OrderStatus::Cancelled && target != OrderStatus::Cancelled {
        return Err(AppError::BadRequest(
            "Cancelled orders cannot be reopened".into(),
        ));
    }

    let order = set_status(&txn, order, target).await?;
    if target == OrderStatus::Cancelled && previous != OrderStatus::Cancelled {
        restock_items(&txn, order.id).await?;
    }

    notify(
        &txn,
        Some(order.user_id),
        NotificationType::OrderStatusChanged,
        Some(order.id),
        format!("Your order #{} is now {}", order.id, target),
    )
    .await?;

    txn.commit().await?;
    tracing::info!(order_id = order.id, from = %previous, to = %target, by = user.user_id, "order status updated");

    Ok(ApiResponse::ok("Order updated", order.into()))
}

/// Remove an order and its lines. Stock held by a live order goes back on the shelf.
pub async fn delete_order(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    user.require(Action::DeleteOrder)?;

    let txn = state.orm.begin().await?;
    let order = lock_order(&txn, id).await?;
    if order.status != OrderStatus::Cancelled {
        restock_items(&txn, order.id).await?;
    }
    Orders::delete_by_id(order.id).exec(&txn).await?;
    txn.commit().await?;

    tracing::info!(order_id = id, by = user.user_id, "order deleted");
    Ok(ApiResponse::ok("Order deleted", serde_json::json!({ "id": id })))
}

pub async fn upload_shipping_bill(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    file: UploadedFile,
) -> AppResult<ApiResponse<Order>> {
    user.require(Action::UploadShippingBill)?;
    if !file.is_image() {
        return Err(AppError::BadRequest("Shipping bill must be an image".into()));
    }
    if Orders::find_by_id(id).one(&state.orm).await?.is_none() {
        return Err(AppError::not_found("Order not found"));
    }

    // Upload before taking the row lock; the HTTP round trip must not hold it.
    let stored = state.storage.upload("shipping_bills", file).await?;

    let txn = state.orm.begin().await?;
    let order = lock_order(&txn, id).await?;
    let mut active: OrderActive = order.into();
    active.shipping_bill_url = Set(Some(stored.url));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    notify(
        &txn,
        Some(order.user_id),
        NotificationType::ShippingBillUploaded,
        Some(order.id),
        format!("The shipping bill for order #{} is available", order.id),
    )
    .await?;
    txn.commit().await?;

    Ok(ApiResponse::ok("Shipping bill uploaded", order.into()))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Order not found"))?;
    user.require_owner_or(order.user_id, Action::ViewAllOrders)?;

    let items = load_items(&state.orm, order.id).await?;
    Ok(ApiResponse::ok(
        "OK",
        OrderWithItems {
            order: order.into(),
            items,
        },
    ))
}

pub async fn list_user_orders(
    state: &AppState,
    user: &AuthUser,
    user_id: i64,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    user.require_owner_or(user_id, Action::ViewAllOrders)?;
    let condition = order_filter(&query).add(OrderCol::UserId.eq(user_id));
    paged_orders(state, condition, &query).await
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    user.require(Action::ViewAllOrders)?;
    paged_orders(state, order_filter(&query), &query).await
}

async fn paged_orders(
    state: &AppState,
    condition: Condition,
    query: &OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let page = query.page();
    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or_default() {
        SortOrder::Asc => finder
            .order_by_asc(OrderCol::CreatedAt)
            .order_by_asc(OrderCol::Id),
        SortOrder::Desc => finder
            .order_by_desc(OrderCol::CreatedAt)
            .order_by_desc(OrderCol::Id),
    };

    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(page.limit())
        .offset(page.offset())
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    Ok(ApiResponse::paged("Ok", OrderList { items }, &page, total))
}

/// Typed filter for order listings; every value is bound as a parameter.
pub fn order_filter(query: &OrderListQuery) -> Condition {
    let mut condition = Condition::all();

    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }
    if let Some(payment_type) = search_term(query.payment_type.as_ref()) {
        condition = condition.add(OrderCol::PaymentType.eq(payment_type));
    }
    if let Some(from) = query.date_from {
        condition = condition.add(OrderCol::CreatedAt.gte(from.and_time(NaiveTime::MIN).and_utc()));
    }
    if let Some(to) = query.date_to {
        // No successor means the range is open-ended.
        if let Some(next) = to.succ_opt() {
            let end = next.and_time(NaiveTime::MIN).and_utc();
            condition = condition.add(OrderCol::CreatedAt.lt(end));
        }
    }
    if let Some(search) = search_term(query.search.as_ref()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(OrderCol::ShippingName).ilike(pattern.clone()))
                .add(Expr::col(OrderCol::ShippingEmail).ilike(pattern.clone()))
                .add(Expr::col(OrderCol::ShippingPhone).ilike(pattern)),
        );
    }

    condition
}

pub fn order_total(items: &[OrderItem]) -> Decimal {
    items
        .iter()
        .map(|item| item.price * Decimal::from(item.quantity))
        .sum()
}

/// Reject totals the `NUMERIC(12, 2)` column cannot hold.
pub fn ensure_storable_total(total: Decimal) -> AppResult<()> {
    if total >= max_amount() {
        return Err(AppError::BadRequest(format!(
            "Order total {} exceeds the maximum of {}",
            total,
            max_amount()
        )));
    }
    Ok(())
}

async fn lock_order(txn: &DatabaseTransaction, id: i64) -> AppResult<OrderModel> {
    Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order not found"))
}

async fn set_status(
    txn: &DatabaseTransaction,
    order: OrderModel,
    status: OrderStatus,
) -> Result<OrderModel, DbErr> {
    let mut active: OrderActive = order.into();
    active.status = Set(status);
    active.updated_at = Set(Utc::now().into());
    active.update(txn).await
}

/// Exact inverse of the decrement done at placement.
async fn restock_items(txn: &DatabaseTransaction, order_id: i64) -> Result<(), DbErr> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::ProductId)
        .all(txn)
        .await?;

    for item in items {
        Products::update_many()
            .col_expr(
                ProdCol::StockQuantity,
                Expr::col(ProdCol::StockQuantity).add(item.quantity),
            )
            .col_expr(ProdCol::UpdatedAt, Expr::current_timestamp().into())
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(txn)
            .await?;
    }
    Ok(())
}

async fn load_items<C: ConnectionTrait>(conn: &C, order_id: i64) -> Result<Vec<OrderItem>, DbErr> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::Id)
        .find_also_related(Products)
        .all(conn)
        .await?
        .into_iter()
        .map(|(item, product)| OrderItem::from_entity(item, product.map(|p| p.name)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sea_orm::{DbBackend, QueryTrait};

    fn sql(query: &OrderListQuery) -> String {
        Orders::find()
            .filter(order_filter(query))
            .build(DbBackend::Postgres)
            .to_string()
    }

    fn item(quantity: i32, price: Decimal) -> OrderItem {
        OrderItem {
            id: 1,
            order_id: 1,
            product_id: 1,
            product_name: None,
            quantity,
            price,
        }
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let items = vec![
            item(2, Decimal::from(10000)),
            item(3, Decimal::new(1250, 2)),
        ];
        assert_eq!(order_total(&items), Decimal::new(2003750, 2));
        assert_eq!(order_total(&[]), Decimal::ZERO);
    }

    #[test]
    fn empty_filter_has_no_where_clause() {
        let sql = sql(&OrderListQuery::default());
        assert!(!sql.contains("WHERE"), "{sql}");
    }

    #[test]
    fn filter_binds_status_and_payment_type() {
        let sql = sql(&OrderListQuery {
            status: Some(OrderStatus::Pending),
            payment_type: Some("bank_transfer".into()),
            ..Default::default()
        });
        assert!(sql.contains("'pending'"), "{sql}");
        assert!(sql.contains("'bank_transfer'"), "{sql}");
        assert!(!sql.contains("ILIKE"), "{sql}");
    }

    #[test]
    fn date_range_is_inclusive_of_the_last_day() {
        let sql = sql(&OrderListQuery {
            date_from: NaiveDate::from_ymd_opt(2024, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2024, 1, 31),
            ..Default::default()
        });
        assert!(sql.contains("2024-01-01"), "{sql}");
        assert!(sql.contains("2024-02-01"), "{sql}");
        assert!(!sql.contains("2024-01-31"), "{sql}");
    }

    #[test]
    fn last_representable_date_leaves_range_open() {
        let sql = sql(&OrderListQuery {
            date_from: NaiveDate::from_ymd_opt(2024, 1, 1),
            date_to: Some(NaiveDate::MAX),
            ..Default::default()
        });
        assert!(sql.contains(r#""created_at" >="#), "{sql}");
        assert!(!sql.contains(r#""created_at" <"#), "{sql}");
    }

    #[test]
    fn totals_must_fit_the_money_column() {
        assert!(ensure_storable_total(Decimal::new(999_999_999_999, 2)).is_ok());
        let err = ensure_storable_total(Decimal::from(10_000_000_000i64)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.starts_with("Order total")));
    }

    #[test]
    fn search_escapes_through_parameters() {
        let sql = sql(&OrderListQuery {
            search: Some("o'brien".into()),
            ..Default::default()
        });
        assert!(sql.contains("ILIKE"), "{sql}");
        assert!(sql.contains("OR"), "{sql}");
        assert!(!sql.contains("'%o'brien%'"), "{sql}");
    }
}
