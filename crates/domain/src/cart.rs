//! The ephemeral shopping cart.

use chrono::{DateTime, Utc};
use common::{CartId, UserId};
use serde::{Deserialize, Serialize};

use crate::inventory::InventoryAdjustment;
use crate::value_objects::{Money, ProductId};

/// A selected product with its quantity and the unit price it was priced at.
///
/// The same type is frozen into an order's line items, so an order never
/// re-reads live product data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(alias = "product_id")]
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(alias = "unit_price")]
    pub unit_price: Money,
}

impl LineItem {
    /// Creates a new line item without a variant.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            variant: None,
            unit_price,
        }
    }

    /// Sets the variant (e.g. a color) of this line.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Returns quantity * unit price.
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// One user's pre-purchase selection.
///
/// Cart pricing is owned by the cart collaborator; this engine only reads
/// `total_price` / `total_after_discount` and deletes the cart once it has
/// been turned into an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: UserId,
    pub items: Vec<LineItem>,
    pub total_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_after_discount: Option<Money>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a user.
    pub fn new(owner: UserId) -> Self {
        Self {
            id: CartId::new(),
            owner,
            items: Vec::new(),
            total_price: Money::zero(),
            total_after_discount: None,
            updated_at: Utc::now(),
        }
    }

    /// Adds a line and recomputes `total_price`.
    pub fn add_item(&mut self, item: LineItem) {
        self.items.push(item);
        self.total_price = self.items.iter().map(LineItem::total_price).sum();
        self.updated_at = Utc::now();
    }

    /// Builder form of [`Cart::add_item`].
    pub fn with_item(mut self, item: LineItem) -> Self {
        self.add_item(item);
        self
    }

    /// Applies a coupon-discounted total.
    pub fn with_discounted_total(mut self, total: Money) -> Self {
        self.total_after_discount = Some(total);
        self
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if `user` owns this cart.
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }

    /// The amount to charge: the discounted total if a coupon applied,
    /// otherwise the plain total.
    pub fn payable_amount(&self) -> Money {
        self.total_after_discount.unwrap_or(self.total_price)
    }

    /// The stock movements selling this cart causes.
    pub fn inventory_adjustments(&self) -> Vec<InventoryAdjustment> {
        InventoryAdjustment::for_sale(&self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cart() -> Cart {
        Cart::new(UserId::new())
            .with_item(LineItem::new("product-a", 2, Money::from_major(10)))
            .with_item(LineItem::new("product-b", 1, Money::from_major(5)))
    }

    #[test]
    fn test_total_is_recomputed_on_add() {
        let cart = sample_cart();
        assert_eq!(cart.total_price, Money::from_major(25));
        assert_eq!(cart.payable_amount(), Money::from_major(25));
    }

    #[test]
    fn test_discount_takes_precedence() {
        let cart = sample_cart().with_discounted_total(Money::from_major(20));
        assert_eq!(cart.payable_amount(), Money::from_major(20));
    }

    #[test]
    fn test_empty_and_ownership() {
        let owner = UserId::new();
        let cart = Cart::new(owner);
        assert!(cart.is_empty());
        assert!(cart.is_owned_by(owner));
        assert!(!cart.is_owned_by(UserId::new()));
    }

    #[test]
    fn test_line_item_variant() {
        let item = LineItem::new("product-a", 1, Money::from_cents(999)).with_variant("red");
        assert_eq!(item.variant.as_deref(), Some("red"));
        assert_eq!(item.total_price().cents(), 999);
    }
}
