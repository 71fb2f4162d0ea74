//! Multipart form decoding shared by the upload endpoints.

use axum::extract::multipart::{Field, Multipart, MultipartError};
use serde::de::DeserializeOwned;

use crate::{
    dto::orders::{OrderItemInput, PlaceOrderRequest, ShippingInfo},
    error::{AppError, AppResult},
    storage::UploadedFile,
};

fn bad_multipart(err: MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
}

async fn read_file(field: Field<'_>, fallback_name: &str) -> AppResult<UploadedFile> {
    let file_name = field.file_name().unwrap_or(fallback_name).to_string();
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(bad_multipart)?;
    Ok(UploadedFile {
        file_name,
        content_type,
        bytes,
    })
}

/// The single non-empty file sent under `name`.
pub async fn single_file(mut multipart: Multipart, name: &str) -> AppResult<UploadedFile> {
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() == Some(name) {
            let file = read_file(field, name).await?;
            if file.bytes.is_empty() {
                break;
            }
            return Ok(file);
        }
    }
    Err(AppError::BadRequest(format!("`{}` file is required", name)))
}

fn parse_json<T: DeserializeOwned>(name: &str, raw: Option<String>) -> AppResult<T> {
    let raw = raw.ok_or_else(|| AppError::BadRequest(format!("`{}` is required", name)))?;
    serde_json::from_str(&raw)
        .map_err(|err| AppError::BadRequest(format!("`{}` is not valid JSON: {}", name, err)))
}

/// Decode an order submission. `items` and `shipping` travel as JSON text fields.
pub async fn order_form(mut multipart: Multipart, user_id: i64) -> AppResult<PlaceOrderRequest> {
    let mut items = None;
    let mut shipping = None;
    let mut payment_type = None;
    let mut payment_proof = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("items") => items = Some(field.text().await.map_err(bad_multipart)?),
            Some("shipping") => shipping = Some(field.text().await.map_err(bad_multipart)?),
            Some("payment_type") => {
                payment_type = Some(field.text().await.map_err(bad_multipart)?)
            }
            Some("payment_proof") => {
                let file = read_file(field, "payment_proof").await?;
                if !file.bytes.is_empty() {
                    payment_proof = Some(file);
                }
            }
            _ => {}
        }
    }

    let items: Vec<OrderItemInput> = parse_json("items", items)?;
    let shipping: ShippingInfo = parse_json("shipping", shipping)?;
    let payment_type =
        payment_type.ok_or_else(|| AppError::BadRequest("`payment_type` is required".into()))?;

    if let Some(file) = &payment_proof {
        if !file.is_image() {
            return Err(AppError::BadRequest("`payment_proof` must be an image".into()));
        }
    }

    Ok(PlaceOrderRequest {
        user_id,
        items,
        shipping,
        payment_type,
        payment_proof,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_json_field_is_a_bad_request() {
        let err = parse_json::<Vec<OrderItemInput>>("items", None).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("items")));
    }

    #[test]
    fn malformed_json_field_is_a_bad_request() {
        let err = parse_json::<ShippingInfo>("shipping", Some("{name:".into())).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("not valid JSON")));
    }

    #[test]
    fn well_formed_items_parse() {
        let items: Vec<OrderItemInput> = parse_json(
            "items",
            Some(r#"[{"product_id":3,"quantity":1,"price":"12.50"}]"#.into()),
        )
        .expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, 3);
    }
}
