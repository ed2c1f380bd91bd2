//! Application error type shared by services and HTTP handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::aggregates::{CartError, CouponError, OrderError, ProductError, ReturnError};
use crate::domain::pricing::PricingError;
use crate::domain::value_objects::SkuError;
use crate::services::media::MediaError;
use crate::services::payment::PaymentError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Return(#[from] ReturnError),

    #[error(transparent)]
    Sku(#[from] SkuError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self { AppError::Validation(errors.to_string()) }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::PermissionDenied { .. }) => StatusCode::FORBIDDEN,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Product(ProductError::VariantNotFound(_) | ProductError::QuestionNotFound) => StatusCode::NOT_FOUND,
            Self::Product(ProductError::InsufficientStock { .. } | ProductError::DuplicateSku(_)) => StatusCode::CONFLICT,
            Self::Cart(CartError::ItemNotFound) | Self::Coupon(CouponError::NotFound) | Self::Order(OrderError::NotFound) => StatusCode::NOT_FOUND,
            Self::Order(OrderError::InvalidTransition { .. } | OrderError::PaymentAlreadySettled) => StatusCode::CONFLICT,
            Self::Return(ReturnError::AlreadyResolved(_)) => StatusCode::CONFLICT,
            Self::Product(_) | Self::Pricing(_) | Self::Cart(_) | Self::Coupon(_) | Self::Order(_) | Self::Return(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Sku(_) | Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Payment(PaymentError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Payment(PaymentError::Signing) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::Media(MediaError::UnsupportedType(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Media(MediaError::TooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Media(MediaError::Empty) => StatusCode::BAD_REQUEST,
            Self::Media(MediaError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = match &self {
            Self::Store(StoreError::PermissionDenied { hint }) => json!({ "error": "permission denied", "hint": hint }),
            // internals stay in the log
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => json!({ "error": "internal error" }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::from(StoreError::NotFound { collection: "orders", id: "x".into() }).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(StoreError::PermissionDenied { hint: "grant".into() }).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::from(CouponError::Expired).status(), StatusCode::UNPROCESSABLE_ENTITY);
        let transition = OrderError::InvalidTransition { from: OrderStatus::Delivered, to: OrderStatus::Cancelled };
        assert_eq!(AppError::from(transition).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::from(PaymentError::NotConfigured).status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
