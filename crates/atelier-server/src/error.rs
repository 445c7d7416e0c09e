//! HTTP error mapping.
//!
//! Every handler returns `Result<_, ApiError>`. The body is always
//! `{"error": <message>, "code": <stable snake_case code>}`.

use atelier_commerce::{CartError, PricingError, TaxonomyError};
use atelier_lifecycle::verification::VerifyError;
use atelier_lifecycle::TransitionError;
use atelier_store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::api_types::ErrorResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, code, message)
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.status, self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) | StoreError::InsufficientStock { .. } | StoreError::Transition(_) => {
                StatusCode::CONFLICT
            }
            StoreError::Backend(msg) => {
                error!(error = %msg, "storage backend error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &e {
            StoreError::Backend(_) => "storage unavailable".to_string(),
            other => other.to_string(),
        };
        Self::new(status, e.code(), message)
    }
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        Self::conflict("illegal_transition", e.to_string())
    }
}

impl From<CartError> for ApiError {
    fn from(e: CartError) -> Self {
        let status = match &e {
            CartError::InsufficientStock { .. } | CartError::ProductUnavailable(_) => StatusCode::CONFLICT,
            CartError::LineNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e.code(), e.to_string())
    }
}

impl From<PricingError> for ApiError {
    fn from(e: PricingError) -> Self {
        Self::bad_request(e.code(), e.to_string())
    }
}

impl From<VerifyError> for ApiError {
    fn from(e: VerifyError) -> Self {
        Self::bad_request(e.code(), e.to_string())
    }
}

impl From<TaxonomyError> for ApiError {
    fn from(e: TaxonomyError) -> Self {
        Self::bad_request("invalid_category", e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn store_errors_map_to_http_statuses() {
        let nf: ApiError = StoreError::not_found("order", Uuid::nil()).into();
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.code, "not_found");

        let cas: ApiError = StoreError::Conflict("stale".into()).into();
        assert_eq!(cas.status, StatusCode::CONFLICT);

        let backend: ApiError = StoreError::Backend("connection reset by 10.0.0.3".into()).into();
        assert_eq!(backend.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!backend.message.contains("10.0.0.3"));
    }

    #[test]
    fn verify_errors_keep_their_codes() {
        let e: ApiError = VerifyError::Expired.into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "code_expired");
    }
}
