use async_trait::async_trait;
use common::{CartId, OrderId};
use domain::{Cart, InventoryAdjustment, Order, ProductId, StockLevel};

use crate::{
    AnomalyRecord, Materialization, MaterializeRequest, OrderQuery, ProcessedEvent, Result,
    StatusChange,
};

/// Read access to carts, plus the write used to seed them.
///
/// Carts are owned by the cart collaborator; the checkout engine only reads
/// them and deletes them as part of [`CheckoutStore::materialize`].
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the cart, or `None` if it does not exist.
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>>;

    /// Inserts or replaces a cart.
    async fn put_cart(&self, cart: Cart) -> Result<()>;
}

/// Durable orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Returns the order materialized from `cart_id`, if any.
    ///
    /// At most one exists per cart.
    async fn find_order_for_cart(&self, cart_id: CartId) -> Result<Option<Order>>;

    /// Lists orders matching `query`, newest first.
    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Applies a payment or delivery transition and returns the updated order.
    ///
    /// Fails with [`StoreError::Order`] if the transition already happened.
    ///
    /// [`StoreError::Order`]: crate::StoreError::Order
    async fn update_status(&self, order_id: OrderId, change: StatusChange) -> Result<Order>;
}

/// Per-product stock counters.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<StockLevel>>;

    /// Inserts or replaces a product's counters.
    async fn set_stock(&self, level: StockLevel) -> Result<()>;

    /// Applies a batch of relative adjustments atomically.
    ///
    /// If any product is unknown the whole batch is rejected with
    /// [`StoreError::UnknownProduct`]. Returns the products whose quantity
    /// is negative after the batch.
    ///
    /// [`StoreError::UnknownProduct`]: crate::StoreError::UnknownProduct
    async fn adjust(&self, batch: &[InventoryAdjustment]) -> Result<Vec<ProductId>>;
}

/// The processed-event ledger and the anomaly log.
#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Returns the ledger entry for a payment event id.
    async fn processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>>;

    /// Lists recorded anomalies, oldest first.
    async fn list_anomalies(&self) -> Result<Vec<AnomalyRecord>>;
}

/// Everything the checkout engine needs from storage.
#[async_trait]
pub trait CheckoutStore: CartStore + OrderStore + InventoryLedger + EventLedger {
    /// Turns a cart into an order as one atomic unit.
    ///
    /// In order:
    /// 1. If `request.event` is set, claim its id. An id already claimed
    ///    yields [`Materialization::Duplicate`] and nothing else happens.
    /// 2. Load the cart. A missing, empty or foreign cart, or one with a
    ///    product the inventory ledger has no row for, yields
    ///    [`Materialization::Anomaly`]; when an event was claimed the
    ///    anomaly and the claim are kept, otherwise nothing is written.
    /// 3. Allocate the next order number and create the order.
    /// 4. Apply the cart's inventory adjustments.
    /// 5. Delete the cart.
    ///
    /// An error leaves no trace: the event id stays unclaimed so a
    /// redelivery can try again.
    async fn materialize(&self, request: MaterializeRequest) -> Result<Materialization>;
}
