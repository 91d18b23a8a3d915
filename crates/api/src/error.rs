//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No trusted identity on the request.
    Unauthorized(String),
    /// The caller is known but lacks the role.
    Forbidden(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout engine error.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::Unauthenticated(_) | CheckoutError::MalformedPayload(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        CheckoutError::InvalidState(_) => (StatusCode::CONFLICT, err.to_string()),
        CheckoutError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CheckoutError::Gateway(_) => {
            tracing::warn!(error = %err, "payment provider call failed");
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
        CheckoutError::Store(_) => {
            tracing::error!(error = %err, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}
