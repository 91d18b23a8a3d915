use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, OrderId, UserId};
use domain::{
    Cart, InventoryAdjustment, LineItem, Money, Order, OrderParts, PaymentMethod, ProductId,
    ShippingAddress, StockLevel,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AnomalyRecord, EventOutcome, Materialization, MaterializeRequest, OrderQuery, ProcessedEvent,
    Result, StatusChange, StoreError,
    store::{CartStore, CheckoutStore, EventLedger, InventoryLedger, OrderStore},
};

const ORDER_COLUMNS: &str = "id, number, owner_id, cart_id, line_items, shipping_address, \
     tax_price, shipping_price, total_price, payment_method, payment_reference, \
     is_paid, paid_at, is_delivered, delivered_at, created_at";

/// PostgreSQL-backed checkout store.
///
/// [`CheckoutStore::materialize`] runs in a single transaction; the cart row
/// is locked with `FOR UPDATE` so concurrent fulfillments of one cart
/// serialize, and inventory rows are updated in product id order.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_cart(row: PgRow) -> Result<Cart> {
        let items: Vec<LineItem> = serde_json::from_value(row.try_get("items")?)?;

        Ok(Cart {
            id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
            owner: UserId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            items,
            total_price: Money::from_cents(row.try_get("total_price")?),
            total_after_discount: row
                .try_get::<Option<i64>, _>("total_after_discount")?
                .map(Money::from_cents),
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let line_items: Vec<LineItem> = serde_json::from_value(row.try_get("line_items")?)?;
        let shipping_address: ShippingAddress =
            serde_json::from_value(row.try_get("shipping_address")?)?;
        let payment_method: PaymentMethod = row
            .try_get::<String, _>("payment_method")?
            .parse()?;

        Ok(Order::from_parts(OrderParts {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            number: row.try_get("number")?,
            owner: UserId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
            line_items,
            shipping_address,
            tax_price: Money::from_cents(row.try_get("tax_price")?),
            shipping_price: Money::from_cents(row.try_get("shipping_price")?),
            total_price: Money::from_cents(row.try_get("total_price")?),
            payment_method,
            payment_reference: row.try_get("payment_reference")?,
            is_paid: row.try_get("is_paid")?,
            paid_at: row.try_get("paid_at")?,
            is_delivered: row.try_get("is_delivered")?,
            delivered_at: row.try_get("delivered_at")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    fn row_to_processed(row: PgRow) -> Result<ProcessedEvent> {
        Ok(ProcessedEvent {
            event_id: row.try_get("event_id")?,
            event_type: row.try_get("event_type")?,
            cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
            outcome: row.try_get::<String, _>("outcome")?.parse()?,
            order_id: row
                .try_get::<Option<Uuid>, _>("order_id")?
                .map(OrderId::from_uuid),
            processed_at: row.try_get("processed_at")?,
        })
    }

    fn row_to_anomaly(row: PgRow) -> Result<AnomalyRecord> {
        Ok(AnomalyRecord {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
            kind: row.try_get::<String, _>("kind")?.parse()?,
            detail: row.try_get("detail")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
        let line_items = serde_json::to_value(order.line_items())?;
        let shipping_address = serde_json::to_value(order.shipping_address())?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, number, owner_id, cart_id, line_items, shipping_address,
                tax_price, shipping_price, total_price, payment_method, payment_reference,
                is_paid, paid_at, is_delivered, delivered_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.number())
        .bind(order.owner().as_uuid())
        .bind(order.cart_id().as_uuid())
        .bind(line_items)
        .bind(shipping_address)
        .bind(order.tax_price().cents())
        .bind(order.shipping_price().cents())
        .bind(order.total_price().cents())
        .bind(order.payment_method().as_str())
        .bind(order.payment_reference())
        .bind(order.is_paid())
        .bind(order.paid_at())
        .bind(order.is_delivered())
        .bind(order.delivered_at())
        .bind(order.created_at())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Applies relative updates row by row. A missing row aborts with
    /// `UnknownProduct`; the caller's transaction then rolls back the rest.
    async fn apply_adjustments(
        conn: &mut PgConnection,
        batch: &[InventoryAdjustment],
    ) -> Result<Vec<ProductId>> {
        let mut backordered = Vec::new();
        for adjustment in batch {
            let quantity: Option<i64> = sqlx::query_scalar(
                r#"
                UPDATE inventory
                SET quantity = quantity + $2, sold = sold + $3
                WHERE product_id = $1
                RETURNING quantity
                "#,
            )
            .bind(adjustment.product_id.as_str())
            .bind(adjustment.delta_quantity)
            .bind(adjustment.delta_sold)
            .fetch_optional(&mut *conn)
            .await?;

            match quantity {
                None => return Err(StoreError::UnknownProduct(adjustment.product_id.clone())),
                Some(q) if q < 0 => backordered.push(adjustment.product_id.clone()),
                Some(_) => {}
            }
        }
        Ok(backordered)
    }

    /// Returns the cart's products that have an inventory row.
    async fn stocked_products(conn: &mut PgConnection, cart: &Cart) -> Result<HashSet<ProductId>> {
        let ids: Vec<String> = cart
            .items
            .iter()
            .map(|item| item.product_id.as_str().to_string())
            .collect();

        let rows: Vec<String> =
            sqlx::query_scalar("SELECT product_id FROM inventory WHERE product_id = ANY($1)")
                .bind(&ids)
                .fetch_all(&mut *conn)
                .await?;

        Ok(rows.into_iter().map(ProductId::new).collect())
    }

    async fn insert_anomaly(conn: &mut PgConnection, anomaly: &AnomalyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fulfillment_anomalies (id, event_id, cart_id, kind, detail, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(anomaly.id)
        .bind(&anomaly.event_id)
        .bind(anomaly.cart_id.as_uuid())
        .bind(anomaly.kind.as_str())
        .bind(&anomaly.detail)
        .bind(anomaly.recorded_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn settle_event(
        conn: &mut PgConnection,
        event_id: &str,
        outcome: EventOutcome,
        order_id: Option<OrderId>,
    ) -> Result<()> {
        sqlx::query("UPDATE processed_events SET outcome = $2, order_id = $3 WHERE event_id = $1")
            .bind(event_id)
            .bind(outcome.as_str())
            .bind(order_id.map(|id| id.as_uuid()))
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, owner_id, items, total_price, total_after_discount, updated_at
            FROM carts
            WHERE id = $1
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_cart).transpose()
    }

    async fn put_cart(&self, cart: Cart) -> Result<()> {
        let items = serde_json::to_value(&cart.items)?;

        sqlx::query(
            r#"
            INSERT INTO carts (id, owner_id, items, total_price, total_after_discount, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                owner_id = EXCLUDED.owner_id,
                items = EXCLUDED.items,
                total_price = EXCLUDED.total_price,
                total_after_discount = EXCLUDED.total_after_discount,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.owner.as_uuid())
        .bind(items)
        .bind(cart.total_price.cents())
        .bind(cart.total_after_discount.map(|m| m.cents()))
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> =
            sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(order_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_for_cart(&self, cart_id: CartId) -> Result<Option<Order>> {
        let row: Option<PgRow> =
            sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE cart_id = $1"))
                .bind(cart_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        if query.owner.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND owner_id = ${param_count}"));
        }
        if query.is_paid.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND is_paid = ${param_count}"));
        }
        if query.is_delivered.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND is_delivered = ${param_count}"));
        }

        sql.push_str(" ORDER BY number DESC");

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(owner) = query.owner {
            sqlx_query = sqlx_query.bind(owner.as_uuid());
        }
        if let Some(is_paid) = query.is_paid {
            sqlx_query = sqlx_query.bind(is_paid);
        }
        if let Some(is_delivered) = query.is_delivered {
            sqlx_query = sqlx_query.bind(is_delivered);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn update_status(&self, order_id: OrderId, change: StatusChange) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let mut order = match row {
            Some(row) => Self::row_to_order(row)?,
            None => return Err(StoreError::OrderNotFound(order_id)),
        };
        change.apply(&mut order, Utc::now())?;

        sqlx::query(
            r#"
            UPDATE orders
            SET is_paid = $2, paid_at = $3, is_delivered = $4, delivered_at = $5
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(order.is_paid())
        .bind(order.paid_at())
        .bind(order.is_delivered())
        .bind(order.delivered_at())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }
}

#[async_trait]
impl InventoryLedger for PostgresStore {
    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<StockLevel>> {
        let row: Option<PgRow> =
            sqlx::query("SELECT product_id, quantity, sold FROM inventory WHERE product_id = $1")
                .bind(product_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(StockLevel {
                product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
                quantity: row.try_get("quantity")?,
                sold: row.try_get("sold")?,
            })),
            None => Ok(None),
        }
    }

    async fn set_stock(&self, level: StockLevel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory (product_id, quantity, sold)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                sold = EXCLUDED.sold
            "#,
        )
        .bind(level.product_id.as_str())
        .bind(level.quantity)
        .bind(level.sold)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn adjust(&self, batch: &[InventoryAdjustment]) -> Result<Vec<ProductId>> {
        let mut tx = self.pool.begin().await?;
        let backordered = Self::apply_adjustments(&mut tx, batch).await?;
        tx.commit().await?;
        Ok(backordered)
    }
}

#[async_trait]
impl EventLedger for PostgresStore {
    async fn processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT event_id, event_type, cart_id, outcome, order_id, processed_at
            FROM processed_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_processed).transpose()
    }

    async fn list_anomalies(&self) -> Result<Vec<AnomalyRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, cart_id, kind, detail, recorded_at
            FROM fulfillment_anomalies
            ORDER BY recorded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_anomaly).collect()
    }
}

#[async_trait]
impl CheckoutStore for PostgresStore {
    async fn materialize(&self, request: MaterializeRequest) -> Result<Materialization> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // Claim the event id. A concurrent claim of the same id blocks here
        // until the other transaction finishes.
        if let Some(event) = &request.event {
            let claimed = sqlx::query(
                r#"
                INSERT INTO processed_events (event_id, event_type, cart_id, outcome, processed_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (event_id) DO NOTHING
                "#,
            )
            .bind(&event.event_id)
            .bind(&event.event_type)
            .bind(request.cart_id.as_uuid())
            .bind(EventOutcome::Fulfilled.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if claimed == 0 {
                tx.rollback().await?;
                let existing = self.processed_event(&event.event_id).await?.ok_or_else(|| {
                    StoreError::Corrupt(format!("claimed event {} has no row", event.event_id))
                })?;
                return Ok(Materialization::Duplicate(existing));
            }
        }

        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, owner_id, items, total_price, total_after_discount, updated_at
            FROM carts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(request.cart_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let cart = row.map(Self::row_to_cart).transpose()?;
        let stocked = match &cart {
            Some(cart) => Self::stocked_products(&mut tx, cart).await?,
            None => HashSet::new(),
        };

        let anomaly = request.check_cart(cart.as_ref(), |product| stocked.contains(product));
        if let Some(anomaly) = anomaly {
            match &request.event {
                Some(event) => {
                    Self::insert_anomaly(&mut tx, &anomaly).await?;
                    Self::settle_event(&mut tx, &event.event_id, EventOutcome::Anomaly, None)
                        .await?;
                    tx.commit().await?;
                }
                None => tx.rollback().await?,
            }
            return Ok(Materialization::Anomaly(anomaly));
        }
        let Some(cart) = cart else {
            return Err(StoreError::Corrupt(format!(
                "cart {} passed checks but was not loaded",
                request.cart_id
            )));
        };

        let number: i64 = sqlx::query_scalar("SELECT nextval('order_number_seq')")
            .fetch_one(&mut *tx)
            .await?;
        let order = Order::from_cart(OrderId::new(), number, &cart, &request.draft, now)?;

        Self::insert_order(&mut tx, &order).await?;
        let backordered = Self::apply_adjustments(&mut tx, &order.inventory_adjustments()).await?;

        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(request.cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        if let Some(event) = &request.event {
            Self::settle_event(
                &mut tx,
                &event.event_id,
                EventOutcome::Fulfilled,
                Some(order.id()),
            )
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            order_id = %order.id(),
            order_number = order.number(),
            cart_id = %request.cart_id,
            "Materialized order"
        );

        Ok(Materialization::Created { order, backordered })
    }
}
