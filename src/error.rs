use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    response::{ApiResponse, Meta},
    storage::StorageError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(#[from] ValidationErrors),

    #[error("Insufficient stock for {product}")]
    InsufficientStock {
        product_id: i64,
        product: String,
        available: i32,
        requested: i32,
    },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Storage error")]
    Storage(#[from] StorageError),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::Validation(_)
            | AppError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DbError(_)
            | AppError::OrmError(_)
            | AppError::Storage(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation(errors) => serde_json::to_value(errors).ok(),
            AppError::InsufficientStock {
                product_id,
                product,
                available,
                requested,
            } => Some(serde_json::json!({
                "product_id": product_id,
                "product": product,
                "available": available,
                "requested": requested,
            })),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            // Full detail stays in the logs, the client gets the generic message.
            match &self {
                AppError::DbError(err) => tracing::error!(error = ?err, "database error"),
                AppError::OrmError(err) => tracing::error!(error = ?err, "orm error"),
                AppError::Storage(err) => tracing::error!(error = ?err, "storage error"),
                AppError::Internal(err) => tracing::error!(error = ?err, "internal error"),
                _ => {}
            }
        }

        let message = self.to_string();
        let body = ApiResponse {
            message: message.clone(),
            data: Some(ErrorData {
                error: message,
                details: self.details(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_errors_hide_detail() {
        let err = AppError::OrmError(sea_orm::DbErr::Custom("relation missing".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "ORM error");
    }

    #[test]
    fn insufficient_stock_carries_counts() {
        let err = AppError::InsufficientStock {
            product_id: 1,
            product: "Ferris Mug".into(),
            available: 5,
            requested: 10,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Insufficient stock for Ferris Mug");
        let details = err.details().expect("details");
        assert_eq!(details["available"], 5);
        assert_eq!(details["requested"], 10);
    }

    #[test]
    fn auth_errors_map_to_401_and_403() {
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Conflict("Email is already taken".into()).status(),
            StatusCode::CONFLICT
        );
    }
}
