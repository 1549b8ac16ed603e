//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kv_store::StoreError;
use provider::ProviderError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Provider operation error.
    Provider(ProviderError),
}

impl ApiError {
    fn status_and_title(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::Provider(err) => match err {
                ProviderError::InvalidKey(_) => (StatusCode::BAD_REQUEST, "InvalidKey"),
                ProviderError::InvalidFilter(_) => (StatusCode::BAD_REQUEST, "InvalidFilter"),
                ProviderError::InvalidEnvelope(_) => (StatusCode::BAD_REQUEST, "InvalidEnvelope"),
                ProviderError::MissingReadModelId { .. } => {
                    (StatusCode::BAD_REQUEST, "MissingReadModelId")
                }
                ProviderError::Store(StoreError::ConditionFailed { .. }) => {
                    (StatusCode::CONFLICT, "ConditionFailed")
                }
                ProviderError::Store(StoreError::InvalidItem(_)) => {
                    (StatusCode::BAD_REQUEST, "InvalidItem")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, title) = self.status_and_title();
        let reason = match self {
            ApiError::NotFound(msg) => msg,
            ApiError::Provider(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %reason, "internal server error");
        }

        let body = serde_json::json!({ "title": title, "reason": reason });
        (status, axum::Json(body)).into_response()
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        ApiError::Provider(err)
    }
}
