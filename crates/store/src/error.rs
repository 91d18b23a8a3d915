use common::OrderId;
use domain::{OrderError, ProductId};
use thiserror::Error;

/// Errors that can occur when interacting with the checkout stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An inventory batch referenced a product the ledger does not track.
    /// The whole batch was rejected.
    #[error("Unknown product in inventory batch: {0}")]
    UnknownProduct(ProductId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An order status transition was rejected.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A stored value could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The backend refused the operation before anything was committed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
