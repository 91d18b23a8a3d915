//! Domain layer for the checkout engine.
//!
//! This crate has no I/O. It provides:
//! - Value objects (money, product ids, shipping addresses)
//! - The ephemeral [`Cart`] and the durable [`Order`] built from it
//! - Relative inventory adjustments applied when a cart is sold
//! - The per-cart [`CheckoutState`] machine

pub mod cart;
pub mod error;
pub mod inventory;
pub mod order;
pub mod state;
pub mod value_objects;

pub use cart::{Cart, LineItem};
pub use common::{CartId, OrderId, UserId};
pub use error::DomainError;
pub use inventory::{InventoryAdjustment, StockLevel};
pub use order::{Order, OrderDraft, OrderError, OrderParts, PaymentMethod, Settlement};
pub use state::CheckoutState;
pub use value_objects::{Money, ProductId, ShippingAddress};
