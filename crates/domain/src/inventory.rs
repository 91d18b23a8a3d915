//! Relative stock movements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cart::LineItem;
use crate::value_objects::ProductId;

/// One relative change to a product's counters.
///
/// Adjustments are deltas, never absolute values, so concurrent batches
/// touching the same product compose without lost updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAdjustment {
    pub product_id: ProductId,
    pub delta_quantity: i64,
    pub delta_sold: i64,
}

impl InventoryAdjustment {
    /// Selling `count` units: `quantity -= count`, `sold += count`.
    pub fn sale(product_id: ProductId, count: u32) -> Self {
        Self::units_sold(product_id, i64::from(count))
    }

    fn units_sold(product_id: ProductId, count: i64) -> Self {
        Self {
            product_id,
            delta_quantity: -count,
            delta_sold: count,
        }
    }

    /// The batch for selling a set of lines.
    ///
    /// Lines for the same product (different variants) are merged, and the
    /// batch is ordered by product id so every writer touches rows in the
    /// same order.
    pub fn for_sale(items: &[LineItem]) -> Vec<Self> {
        // Summed in i64: many lines of one product can exceed u32.
        let mut counts: BTreeMap<&ProductId, i64> = BTreeMap::new();
        for item in items {
            *counts.entry(&item.product_id).or_default() += i64::from(item.quantity);
        }
        counts
            .into_iter()
            .map(|(product_id, count)| Self::units_sold(product_id.clone(), count))
            .collect()
    }
}

/// Stock counters for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    /// Units available. Negative when backordered.
    pub quantity: i64,
    /// Cumulative units sold.
    pub sold: i64,
}

impl StockLevel {
    /// Creates counters for a product.
    pub fn new(product_id: impl Into<ProductId>, quantity: i64, sold: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            sold,
        }
    }

    /// Applies a relative adjustment.
    pub fn apply(&mut self, adjustment: &InventoryAdjustment) {
        self.quantity += adjustment.delta_quantity;
        self.sold += adjustment.delta_sold;
    }

    /// Returns true if more units were sold than were in stock.
    pub fn is_backordered(&self) -> bool {
        self.quantity < 0
    }
}
