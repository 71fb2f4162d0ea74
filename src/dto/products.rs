use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200), custom(function = "super::not_blank"))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(custom(function = "super::positive_decimal"))]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock_quantity: i32,
    #[validate(url)]
    pub image_url: Option<String>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200), custom(function = "super::not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(custom(function = "super::positive_decimal"))]
    pub price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StockAdjustRequest {
    /// Signed change applied to `stock_quantity`
    pub delta: i32,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn create(price: &str) -> CreateProductRequest {
        CreateProductRequest {
            name: "Mug".into(),
            description: None,
            price: Decimal::from_str(price).unwrap(),
            stock_quantity: 3,
            image_url: None,
            category_id: None,
        }
    }

    #[test]
    fn product_price_must_fit_two_decimals() {
        assert!(create("12.50").validate().is_ok());
        let errors = create("12.505").validate().unwrap_err();
        assert!(errors.field_errors().contains_key("price"));
    }

    #[test]
    fn price_update_is_bounded() {
        let update = UpdateProductRequest {
            price: Some(Decimal::from(10_000_000_000i64)),
            ..Default::default()
        };
        let errors = update.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("price"));
    }
}
