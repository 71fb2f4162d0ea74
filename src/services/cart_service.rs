use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use validator::Validate;

use crate::{
    db::DbPool,
    dto::cart::{
        AddToCartRequest, CartItemDto, CartList, MAX_CART_QUANTITY, UpdateCartItemRequest,
    },
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, policy::Action},
    models::{CartItem, Product},
    response::ApiResponse,
    routes::params::Pagination,
};

#[derive(FromRow)]
struct CartWithProductRow {
    cart_id: i64,
    quantity: i32,
    product_id: i64,
    name: String,
    description: Option<String>,
    price: Decimal,
    stock_quantity: i32,
    image_url: Option<String>,
    category_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartWithProductRow> for CartItemDto {
    fn from(row: CartWithProductRow) -> Self {
        let subtotal = row.price * Decimal::from(row.quantity);
        CartItemDto {
            id: row.cart_id,
            product: Product {
                id: row.product_id,
                name: row.name,
                description: row.description,
                price: row.price,
                stock_quantity: row.stock_quantity,
                image_url: row.image_url,
                category_id: row.category_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            quantity: row.quantity,
            subtotal,
        }
    }
}

pub async fn list_cart(
    pool: &DbPool,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    user.require(Action::UseCart)?;
    let page = pagination.normalize();
    let rows = sqlx::query_as::<_, CartWithProductRow>(
        r#"
        SELECT ci.id AS cart_id, ci.quantity,
               p.id AS product_id, p.name, p.description, p.price, p.stock_quantity,
               p.image_url, p.category_id, p.created_at, p.updated_at
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.user_id = $1
        ORDER BY ci.created_at DESC, ci.id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user.user_id)
    .bind(page.per_page)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    // Count and price the whole cart, not just this page.
    let (count, total_price): (i64, Decimal) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(p.price * ci.quantity), 0)
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.user_id = $1
        "#,
    )
    .bind(user.user_id)
    .fetch_one(pool)
    .await?;

    let items: Vec<CartItemDto> = rows.into_iter().map(CartItemDto::from).collect();

    Ok(ApiResponse::paged(
        "OK",
        CartList {
            items,
            total: total_price,
        },
        &page,
        count as u64,
    ))
}

/// Adding a product already in the cart increases its quantity.
pub async fn add_to_cart(
    pool: &DbPool,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    user.require(Action::UseCart)?;
    payload.validate()?;

    let product_exist: Option<(i64,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(payload.product_id)
        .fetch_optional(pool)
        .await?;
    if product_exist.is_none() {
        return Err(AppError::not_found(format!(
            "Product {} not found",
            payload.product_id
        )));
    }

    // The conflict branch skips the update, returning no row, once the cap would be passed.
    let cart_item = sqlx::query_as::<_, CartItem>(
        r#"
        INSERT INTO cart_items (user_id, product_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, product_id)
        DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
        WHERE cart_items.quantity + EXCLUDED.quantity <= $4
        RETURNING id, user_id, product_id, quantity, created_at
        "#,
    )
    .bind(user.user_id)
    .bind(payload.product_id)
    .bind(payload.quantity)
    .bind(MAX_CART_QUANTITY)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        AppError::BadRequest(format!(
            "Cart quantity for product {} cannot exceed {}",
            payload.product_id, MAX_CART_QUANTITY
        ))
    })?;

    tracing::debug!(user_id = user.user_id, product_id = payload.product_id, quantity = cart_item.quantity, "cart updated");
    Ok(ApiResponse::ok("Added to cart", cart_item))
}

pub async fn update_cart_item(
    pool: &DbPool,
    user: &AuthUser,
    product_id: i64,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartItem>> {
    user.require(Action::UseCart)?;
    payload.validate()?;

    let cart_item = sqlx::query_as::<_, CartItem>(
        r#"
        UPDATE cart_items
        SET quantity = $3
        WHERE user_id = $1 AND product_id = $2
        RETURNING id, user_id, product_id, quantity, created_at
        "#,
    )
    .bind(user.user_id)
    .bind(product_id)
    .bind(payload.quantity)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Cart item not found"))?;

    Ok(ApiResponse::ok("Cart updated", cart_item))
}

pub async fn remove_from_cart(
    pool: &DbPool,
    user: &AuthUser,
    product_id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    user.require(Action::UseCart)?;
    let result = sqlx::query("DELETE FROM cart_items WHERE product_id = $1 AND user_id = $2")
        .bind(product_id)
        .bind(user.user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Cart item not found"));
    }

    Ok(ApiResponse::ok("Removed from cart", serde_json::json!({})))
}

pub async fn clear_cart(
    pool: &DbPool,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    user.require(Action::UseCart)?;
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .execute(pool)
        .await?;

    Ok(ApiResponse::ok(
        "Cart cleared",
        serde_json::json!({ "removed": result.rows_affected() }),
    ))
}
