//! Records written by fulfillment: processed payment events, anomalies, and
//! the request/response types of [`CheckoutStore::materialize`].
//!
//! [`CheckoutStore::materialize`]: crate::store::CheckoutStore::materialize

use chrono::{DateTime, Utc};
use common::{CartId, OrderId, UserId};
use domain::{Cart, Order, OrderDraft, OrderError, ProductId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// What happened to a payment event that passed the idempotency gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// An order was materialized.
    Fulfilled,
    /// The event was consumed without an order; see the anomaly ledger.
    Anomaly,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Fulfilled => "fulfilled",
            EventOutcome::Anomaly => "anomaly",
        }
    }
}

impl std::str::FromStr for EventOutcome {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fulfilled" => Ok(EventOutcome::Fulfilled),
            "anomaly" => Ok(EventOutcome::Anomaly),
            other => Err(StoreError::Corrupt(format!("unknown event outcome '{other}'"))),
        }
    }
}

/// One row per handled payment notification, keyed by the provider's event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub event_type: String,
    pub cart_id: CartId,
    pub outcome: EventOutcome,
    pub order_id: Option<OrderId>,
    pub processed_at: DateTime<Utc>,
}

/// Why a fulfillment could not produce an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// The cart is gone: consumed by an earlier run, expired, or never existed.
    CartMissing,
    /// The cart exists but has no lines.
    EmptyCart,
    /// The cart belongs to someone else.
    OwnerMismatch,
    /// A line references a product the inventory ledger does not know.
    UnknownProduct,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::CartMissing => "cart_missing",
            AnomalyKind::EmptyCart => "empty_cart",
            AnomalyKind::OwnerMismatch => "owner_mismatch",
            AnomalyKind::UnknownProduct => "unknown_product",
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AnomalyKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cart_missing" => Ok(AnomalyKind::CartMissing),
            "empty_cart" => Ok(AnomalyKind::EmptyCart),
            "owner_mismatch" => Ok(AnomalyKind::OwnerMismatch),
            "unknown_product" => Ok(AnomalyKind::UnknownProduct),
            other => Err(StoreError::Corrupt(format!("unknown anomaly kind '{other}'"))),
        }
    }
}

/// A fulfillment that needs operator reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub id: Uuid,
    /// The payment event that hit the anomaly. `None` for direct orders,
    /// whose anomalies are reported to the caller and never persisted.
    pub event_id: Option<String>,
    pub cart_id: CartId,
    pub kind: AnomalyKind,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

impl AnomalyRecord {
    pub fn new(
        event_id: Option<String>,
        cart_id: CartId,
        kind: AnomalyKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            cart_id,
            kind,
            detail: detail.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// The idempotency key of a payment notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEventRef {
    pub event_id: String,
    pub event_type: String,
}

/// Input to [`CheckoutStore::materialize`].
///
/// [`CheckoutStore::materialize`]: crate::store::CheckoutStore::materialize
#[derive(Debug, Clone)]
pub struct MaterializeRequest {
    pub cart_id: CartId,
    /// When set, the cart must belong to this user.
    pub expected_owner: Option<UserId>,
    pub draft: OrderDraft,
    /// When set, the event id is claimed in the processed-event ledger in
    /// the same atomic unit as the order.
    pub event: Option<PaymentEventRef>,
}

/// Result of [`CheckoutStore::materialize`].
///
/// [`CheckoutStore::materialize`]: crate::store::CheckoutStore::materialize
#[derive(Debug, Clone)]
pub enum Materialization {
    /// The order was created, stock adjusted and the cart deleted.
    Created {
        order: Order,
        /// Products whose available quantity went below zero.
        backordered: Vec<ProductId>,
    },
    /// The event id had already been claimed. Nothing was written.
    Duplicate(ProcessedEvent),
    /// No order was created. For payment events the anomaly and the
    /// consumed event id were persisted.
    Anomaly(AnomalyRecord),
}

impl MaterializeRequest {
    /// Returns the anomaly that prevents `cart` from becoming an order, if any.
    ///
    /// `is_stocked` reports whether the inventory ledger has a row for a
    /// product.
    pub(crate) fn check_cart(
        &self,
        cart: Option<&Cart>,
        is_stocked: impl Fn(&ProductId) -> bool,
    ) -> Option<AnomalyRecord> {
        let event_id = self.event.as_ref().map(|e| e.event_id.clone());
        let (kind, detail) = match cart {
            None => (
                AnomalyKind::CartMissing,
                format!("cart {} does not exist", self.cart_id),
            ),
            Some(cart) if cart.is_empty() => (
                AnomalyKind::EmptyCart,
                format!("cart {} has no items", self.cart_id),
            ),
            Some(cart) => match self.expected_owner {
                Some(owner) if !cart.is_owned_by(owner) => (
                    AnomalyKind::OwnerMismatch,
                    format!("cart {} is not owned by user {owner}", self.cart_id),
                ),
                _ => {
                    let mut unknown: Vec<&str> = cart
                        .items
                        .iter()
                        .map(|item| &item.product_id)
                        .filter(|product| !is_stocked(*product))
                        .map(ProductId::as_str)
                        .collect();
                    unknown.sort_unstable();
                    unknown.dedup();
                    if unknown.is_empty() {
                        return None;
                    }
                    (
                        AnomalyKind::UnknownProduct,
                        format!(
                            "cart {} references unknown products: {}",
                            self.cart_id,
                            unknown.join(", ")
                        ),
                    )
                }
            },
        };
        Some(AnomalyRecord::new(event_id, self.cart_id, kind, detail))
    }
}

/// An order status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Paid,
    Delivered,
}

impl StatusChange {
    /// Applies the transition to `order`.
    pub fn apply(self, order: &mut Order, now: DateTime<Utc>) -> Result<(), OrderError> {
        match self {
            StatusChange::Paid => order.mark_paid(now),
            StatusChange::Delivered => order.mark_delivered(now),
        }
    }
}
