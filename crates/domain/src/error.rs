//! Domain error types.

use thiserror::Error;

use crate::order::OrderError;
use crate::state::CheckoutState;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred on an order.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A shipping address failed validation.
    #[error("Invalid shipping address: {0}")]
    InvalidAddress(String),

    /// A checkout tried to move between states that are not connected.
    #[error("Invalid checkout transition from {from} to {to}")]
    InvalidTransition {
        from: CheckoutState,
        to: CheckoutState,
    },
}
