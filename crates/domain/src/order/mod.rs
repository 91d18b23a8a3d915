//! The durable order and its lifecycle.

mod model;

pub use model::{Order, OrderDraft, OrderParts, PaymentMethod, Settlement};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// An order cannot be built from a cart without lines.
    #[error("Order has no items")]
    NoItems,

    /// The order was already marked paid.
    #[error("Invalid state transition: order {number} is already paid")]
    AlreadyPaid { number: i64 },

    /// The order was already marked delivered.
    #[error("Invalid state transition: order {number} is already delivered")]
    AlreadyDelivered { number: i64 },

    /// A stored payment method string was not recognised.
    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),
}
