//! Order model.

use chrono::{DateTime, Utc};
use common::{CartId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::OrderError;
use crate::cart::{Cart, LineItem};
use crate::inventory::InventoryAdjustment;
use crate::value_objects::{Money, ShippingAddress};

/// How the order is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Paid on delivery; created unpaid by the direct order path.
    Cash,
    /// Paid through the payment provider before the order exists.
    Card,
}

impl PaymentMethod {
    /// Returns the method name as stored and rendered.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            other => Err(OrderError::UnknownPaymentMethod(other.to_string())),
        }
    }
}

/// How the money for an order was (or will be) collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Collected on delivery. The order total is the cart's payable amount.
    Cash,
    /// Settled by the payment provider. The order total is what the
    /// provider reports, not what the cart says.
    Card {
        amount: Money,
        paid_at: DateTime<Utc>,
        payment_reference: String,
    },
}

/// Everything needed to turn a cart into an order besides the cart itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub shipping_address: ShippingAddress,
    pub settlement: Settlement,
}

impl OrderDraft {
    /// A cash-on-delivery order.
    pub fn cash(shipping_address: ShippingAddress) -> Self {
        Self {
            shipping_address,
            settlement: Settlement::Cash,
        }
    }

    /// An order already paid through the provider.
    pub fn card(
        shipping_address: ShippingAddress,
        amount: Money,
        paid_at: DateTime<Utc>,
        payment_reference: impl Into<String>,
    ) -> Self {
        Self {
            shipping_address,
            settlement: Settlement::Card {
                amount,
                paid_at,
                payment_reference: payment_reference.into(),
            },
        }
    }
}

/// Raw order fields, used by stores to rebuild an [`Order`] from rows.
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub number: i64,
    pub owner: UserId,
    pub cart_id: CartId,
    pub line_items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub tax_price: Money,
    pub shipping_price: Money,
    pub total_price: Money,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A durable purchase record.
///
/// Line items and totals are fixed when the order is built from a cart.
/// The only mutations are the payment and delivery status transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    number: i64,
    owner: UserId,
    cart_id: CartId,
    line_items: Vec<LineItem>,
    shipping_address: ShippingAddress,
    tax_price: Money,
    shipping_price: Money,
    total_price: Money,
    payment_method: PaymentMethod,
    payment_reference: Option<String>,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Order {
    /// Builds an order from a snapshot of `cart`.
    ///
    /// Tax and shipping are zero at checkout; the total is the item amount
    /// plus both.
    pub fn from_cart(
        id: OrderId,
        number: i64,
        cart: &Cart,
        draft: &OrderDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if cart.is_empty() {
            return Err(OrderError::NoItems);
        }

        let tax_price = Money::zero();
        let shipping_price = Money::zero();

        let (payment_method, items_price, is_paid, paid_at, payment_reference) =
            match &draft.settlement {
                Settlement::Cash => (PaymentMethod::Cash, cart.payable_amount(), false, None, None),
                Settlement::Card {
                    amount,
                    paid_at,
                    payment_reference,
                } => (
                    PaymentMethod::Card,
                    *amount,
                    true,
                    Some(*paid_at),
                    Some(payment_reference.clone()),
                ),
            };

        Ok(Self {
            id,
            number,
            owner: cart.owner,
            cart_id: cart.id,
            line_items: cart.items.clone(),
            shipping_address: draft.shipping_address.clone(),
            tax_price,
            shipping_price,
            total_price: items_price + tax_price + shipping_price,
            payment_method,
            payment_reference,
            is_paid,
            paid_at,
            is_delivered: false,
            delivered_at: None,
            created_at: now,
        })
    }

    /// Rebuilds an order from stored fields.
    pub fn from_parts(parts: OrderParts) -> Self {
        Self {
            id: parts.id,
            number: parts.number,
            owner: parts.owner,
            cart_id: parts.cart_id,
            line_items: parts.line_items,
            shipping_address: parts.shipping_address,
            tax_price: parts.tax_price,
            shipping_price: parts.shipping_price,
            total_price: parts.total_price,
            payment_method: parts.payment_method,
            payment_reference: parts.payment_reference,
            is_paid: parts.is_paid,
            paid_at: parts.paid_at,
            is_delivered: parts.is_delivered,
            delivered_at: parts.delivered_at,
            created_at: parts.created_at,
        }
    }

    /// Records payment collected outside the provider (cash on delivery).
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.is_paid {
            return Err(OrderError::AlreadyPaid {
                number: self.number,
            });
        }
        self.is_paid = true;
        self.paid_at = Some(now);
        Ok(())
    }

    /// Records delivery.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.is_delivered {
            return Err(OrderError::AlreadyDelivered {
                number: self.number,
            });
        }
        self.is_delivered = true;
        self.delivered_at = Some(now);
        Ok(())
    }

    /// The stock movements this order caused.
    pub fn inventory_adjustments(&self) -> Vec<InventoryAdjustment> {
        InventoryAdjustment::for_sale(&self.line_items)
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Human-facing sequence number.
    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    /// The cart this order was materialized from.
    pub fn cart_id(&self) -> CartId {
        self.cart_id
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    pub fn tax_price(&self) -> Money {
        self.tax_price
    }

    pub fn shipping_price(&self) -> Money {
        self.shipping_price
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    /// Provider session id for card orders.
    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    pub fn is_paid(&self) -> bool {
        self.is_paid
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn is_delivered(&self) -> bool {
        self.is_delivered
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
