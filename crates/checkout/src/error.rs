//! Checkout error types.

use domain::DomainError;
use store::StoreError;
use thiserror::Error;

use crate::signature::SignatureError;

/// Errors that can occur during checkout operations.
///
/// Duplicate deliveries and unresolvable carts are not errors; see
/// [`NotificationOutcome`](crate::NotificationOutcome).
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The payment notification signature did not verify. Nothing was done.
    #[error("Unauthenticated notification: {0}")]
    Unauthenticated(#[from] SignatureError),

    /// The request or notification body could not be understood.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The cart or order is not in a state that allows the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The cart or order does not exist for this caller.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The payment provider rejected or failed the call.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// Storage failed before anything was committed. Safe to retry.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(id) => CheckoutError::NotFound(format!("Order {id}")),
            StoreError::Order(e) => CheckoutError::InvalidState(e.to_string()),
            other => CheckoutError::Store(other),
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidAddress(msg) => CheckoutError::MalformedPayload(msg),
            other => CheckoutError::InvalidState(other.to_string()),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
