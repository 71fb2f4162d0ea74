use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::Product;

/// Upper bound for a single cart line, however it is reached.
pub const MAX_CART_QUANTITY: i32 = 10_000;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AddToCartRequest {
    #[validate(range(min = 1))]
    pub product_id: i64,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartList {
    pub items: Vec<CartItemDto>,
    /// Value of the whole cart, across all pages
    pub total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemDto {
    pub id: i64,
    pub product: Product,
    pub quantity: i32,
    pub subtotal: Decimal,
}
