use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    entity::sea_orm_active_enums::OrderStatus,
    models::{Order, OrderItem},
    storage::UploadedFile,
};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct OrderItemInput {
    #[validate(range(min = 1))]
    pub product_id: i64,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Unit price captured on the order line
    #[validate(custom(function = "super::positive_decimal"))]
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct ShippingInfo {
    #[validate(length(min = 1, max = 100), custom(function = "super::not_blank"))]
    pub name: String,
    #[validate(length(min = 1, max = 500), custom(function = "super::not_blank"))]
    pub address: String,
    #[validate(length(min = 1, max = 30), custom(function = "super::not_blank"))]
    pub phone: String,
    #[validate(email, length(max = 255))]
    pub email: String,
}

/// A fully parsed order submission.
#[derive(Debug, Validate)]
pub struct PlaceOrderRequest {
    #[validate(range(min = 1))]
    pub user_id: i64,
    #[validate(length(min = 1, max = 100), nested)]
    pub items: Vec<OrderItemInput>,
    #[validate(nested)]
    pub shipping: ShippingInfo,
    #[validate(length(min = 1, max = 50), custom(function = "super::not_blank"))]
    pub payment_type: String,
    pub payment_proof: Option<UploadedFile>,
}

/// Multipart body of `POST /api/orders`; `items` and `shipping` are JSON text fields.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct PlaceOrderForm {
    /// JSON array of `{product_id, quantity, price}`
    #[schema(example = r#"[{"product_id":1,"quantity":2,"price":"10000"}]"#)]
    pub items: String,
    /// JSON object `{name, address, phone, email}`
    pub shipping: String,
    pub payment_type: String,
    #[schema(value_type = Option<String>, format = Binary)]
    pub payment_proof: Option<Vec<u8>>,
}

/// Multipart body carrying a single image in `file`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct FileUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlacedOrder {
    pub order_id: i64,
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PlaceOrderRequest {
        PlaceOrderRequest {
            user_id: 1,
            items: vec![OrderItemInput {
                product_id: 1,
                quantity: 2,
                price: Decimal::from(10000),
            }],
            shipping: ShippingInfo {
                name: "Ada".into(),
                address: "1 Crab Street".into(),
                phone: "0800".into(),
                email: "ada@example.com".into(),
            },
            payment_type: "bank_transfer".into(),
            payment_proof: None,
        }
    }

    #[test]
    fn accepts_well_formed_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn rejects_empty_items() {
        let mut req = request();
        req.items.clear();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("items"));
    }

    #[test]
    fn rejects_non_positive_quantity_and_price() {
        let mut req = request();
        req.items[0].quantity = 0;
        req.items[0].price = Decimal::ZERO;
        assert!(req.validate().is_err());

        let mut req = request();
        req.items[0].price = Decimal::from(-5);
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_blank_shipping_fields_and_bad_email() {
        let mut req = request();
        req.shipping.name = "   ".into();
        assert!(req.validate().is_err());

        let mut req = request();
        req.shipping.email = "not-an-email".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_invalid_user_and_payment_type() {
        let mut req = request();
        req.user_id = 0;
        assert!(req.validate().unwrap_err().field_errors().contains_key("user_id"));

        let mut req = request();
        req.payment_type = "x".repeat(51);
        assert!(req.validate().is_err());
    }

    #[test]
    fn items_parse_from_form_json() {
        let items: Vec<OrderItemInput> =
            serde_json::from_str(r#"[{"product_id":1,"quantity":2,"price":10000}]"#)
                .expect("items json");
        assert_eq!(items[0].price, Decimal::from(10000));

        let items: Vec<OrderItemInput> =
            serde_json::from_str(r#"[{"product_id":1,"quantity":2,"price":"10000.50"}]"#)
                .expect("items json with string price");
        assert_eq!(items[0].price, Decimal::new(1000050, 2));
    }
}
