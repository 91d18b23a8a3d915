use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, OrderId};
use domain::{Cart, InventoryAdjustment, Order, ProductId, StockLevel};
use tokio::sync::RwLock;

use crate::{
    AnomalyRecord, EventOutcome, Materialization, MaterializeRequest, OrderQuery, ProcessedEvent,
    Result, StatusChange, StoreError,
    store::{CartStore, CheckoutStore, EventLedger, InventoryLedger, OrderStore},
};

#[derive(Default)]
struct State {
    carts: HashMap<CartId, Cart>,
    orders: HashMap<OrderId, Order>,
    stock: HashMap<ProductId, StockLevel>,
    processed: HashMap<String, ProcessedEvent>,
    anomalies: Vec<AnomalyRecord>,
    last_order_number: i64,
}

impl State {
    /// Validates the whole batch before touching any counter.
    fn apply_adjustments(&mut self, batch: &[InventoryAdjustment]) -> Result<Vec<ProductId>> {
        if let Some(unknown) = batch.iter().find(|a| !self.stock.contains_key(&a.product_id)) {
            return Err(StoreError::UnknownProduct(unknown.product_id.clone()));
        }

        let mut backordered = Vec::new();
        for adjustment in batch {
            if let Some(level) = self.stock.get_mut(&adjustment.product_id) {
                level.apply(adjustment);
                if level.is_backordered() {
                    backordered.push(adjustment.product_id.clone());
                }
            }
        }
        Ok(backordered)
    }
}

/// In-memory checkout store for tests and single-process deployments.
///
/// Every write runs under one lock, which makes [`CheckoutStore::materialize`]
/// atomic and serializes concurrent fulfillments.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    fail_on_materialize: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `materialize` fail with [`StoreError::Unavailable`] before
    /// writing anything.
    pub fn set_fail_on_materialize(&self, fail: bool) {
        self.fail_on_materialize.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Clears all data.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&cart_id).cloned())
    }

    async fn put_cart(&self, cart: Cart) -> Result<()> {
        self.state.write().await.carts.insert(cart.id, cart);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn find_order_for_cart(&self, cart_id: CartId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.cart_id() == cart_id)
            .cloned())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.number()));
        Ok(orders)
    }

    async fn update_status(&self, order_id: OrderId, change: StatusChange) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        change.apply(order, Utc::now())?;
        Ok(order.clone())
    }
}

#[async_trait]
impl InventoryLedger for InMemoryStore {
    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<StockLevel>> {
        Ok(self.state.read().await.stock.get(product_id).cloned())
    }

    async fn set_stock(&self, level: StockLevel) -> Result<()> {
        self.state
            .write()
            .await
            .stock
            .insert(level.product_id.clone(), level);
        Ok(())
    }

    async fn adjust(&self, batch: &[InventoryAdjustment]) -> Result<Vec<ProductId>> {
        self.state.write().await.apply_adjustments(batch)
    }
}

#[async_trait]
impl EventLedger for InMemoryStore {
    async fn processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>> {
        Ok(self.state.read().await.processed.get(event_id).cloned())
    }

    async fn list_anomalies(&self) -> Result<Vec<AnomalyRecord>> {
        Ok(self.state.read().await.anomalies.clone())
    }
}

#[async_trait]
impl CheckoutStore for InMemoryStore {
    async fn materialize(&self, request: MaterializeRequest) -> Result<Materialization> {
        if self.fail_on_materialize.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "Simulated store failure".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        let now = Utc::now();

        if let Some(event) = &request.event
            && let Some(existing) = state.processed.get(&event.event_id)
        {
            return Ok(Materialization::Duplicate(existing.clone()));
        }

        let anomaly = request.check_cart(state.carts.get(&request.cart_id), |product| {
            state.stock.contains_key(product)
        });
        if let Some(anomaly) = anomaly {
            if let Some(event) = &request.event {
                state.processed.insert(
                    event.event_id.clone(),
                    ProcessedEvent {
                        event_id: event.event_id.clone(),
                        event_type: event.event_type.clone(),
                        cart_id: request.cart_id,
                        outcome: EventOutcome::Anomaly,
                        order_id: None,
                        processed_at: now,
                    },
                );
                state.anomalies.push(anomaly.clone());
            }
            return Ok(Materialization::Anomaly(anomaly));
        }

        let Some(cart) = state.carts.get(&request.cart_id) else {
            return Err(StoreError::Corrupt(format!(
                "cart {} vanished under the write lock",
                request.cart_id
            )));
        };

        let order = Order::from_cart(
            OrderId::new(),
            state.last_order_number + 1,
            cart,
            &request.draft,
            now,
        )?;

        // Nothing has been mutated yet, so a rejected batch leaves the state untouched.
        let backordered = state.apply_adjustments(&order.inventory_adjustments())?;

        state.last_order_number = order.number();
        state.carts.remove(&request.cart_id);
        state.orders.insert(order.id(), order.clone());

        if let Some(event) = &request.event {
            state.processed.insert(
                event.event_id.clone(),
                ProcessedEvent {
                    event_id: event.event_id.clone(),
                    event_type: event.event_type.clone(),
                    cart_id: request.cart_id,
                    outcome: EventOutcome::Fulfilled,
                    order_id: Some(order.id()),
                    processed_at: now,
                },
            );
        }

        tracing::debug!(
            order_id = %order.id(),
            order_number = order.number(),
            cart_id = %request.cart_id,
            "Materialized order"
        );

        Ok(Materialization::Created { order, backordered })
    }
}
