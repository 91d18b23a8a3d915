//! Checkout and fulfillment.
//!
//! Two paths turn a cart into an order:
//! - **Card**: [`CheckoutEngine::create_session`] opens a provider payment
//!   page; the provider later posts a signed notification which
//!   [`CheckoutEngine::process_notification`] verifies, deduplicates by event
//!   id and fulfills.
//! - **Cash**: [`CheckoutEngine::create_cash_order`] fulfills synchronously
//!   with an unpaid order.
//!
//! Either way the order, the inventory adjustments and the cart deletion
//! commit together through [`store::CheckoutStore::materialize`].

pub mod engine;
pub mod error;
pub mod event;
pub mod gateway;
pub mod signature;

pub use engine::{
    CheckoutEngine, CheckoutSettings, Customer, NotificationOutcome, Verification, Viewer,
};
pub use error::{CheckoutError, Result};
pub use event::{CHECKOUT_SESSION_COMPLETED, CompletedSession, PaymentEvent};
pub use gateway::{
    CheckoutSession, InMemoryPaymentGateway, PaymentGateway, SessionRequest, StripeGateway,
};
pub use signature::{SignatureError, SignatureVerifier};
