//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate every table
//! before each test, so they are serialized. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{CartId, OrderId, UserId};
use domain::{Cart, InventoryAdjustment, LineItem, Money, OrderDraft, ProductId, ShippingAddress, StockLevel};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    AnomalyKind, CartStore, CheckoutStore, EventLedger, EventOutcome, InventoryLedger,
    Materialization, MaterializeRequest, OrderQuery, OrderStore, PaymentEventRef, PostgresStore,
    StatusChange, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_checkout_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// A store on a fresh pool with every table emptied.
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE carts, orders, inventory, processed_events, fulfillment_anomalies",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn address() -> ShippingAddress {
    ShippingAddress {
        details: "12 Nile St".to_string(),
        city: "Cairo".to_string(),
        phone: Some("0100000000".to_string()),
        postal_code: Some("11511".to_string()),
    }
}

async fn seed(store: &PostgresStore, owner: UserId) -> Cart {
    store.set_stock(StockLevel::new("product-a", 10, 0)).await.unwrap();
    store.set_stock(StockLevel::new("product-b", 10, 0)).await.unwrap();

    let cart = Cart::new(owner)
        .with_item(LineItem::new("product-a", 2, Money::from_major(10)).with_variant("red"))
        .with_item(LineItem::new("product-b", 1, Money::from_major(5)));
    store.put_cart(cart.clone()).await.unwrap();
    cart
}

fn card_request(cart_id: CartId, event_id: &str) -> MaterializeRequest {
    MaterializeRequest {
        cart_id,
        expected_owner: None,
        draft: OrderDraft::card(address(), Money::from_major(25), Utc::now(), "cs_test_1"),
        event: Some(PaymentEventRef {
            event_id: event_id.to_string(),
            event_type: "checkout.session.completed".to_string(),
        }),
    }
}

#[tokio::test]
#[serial]
async fn cart_roundtrip() {
    let store = get_test_store().await;
    let cart = seed(&store, UserId::new())
        .await
        .with_discounted_total(Money::from_major(20));
    store.put_cart(cart.clone()).await.unwrap();

    let loaded = store.get_cart(cart.id).await.unwrap().unwrap();
    assert_eq!(loaded.items, cart.items);
    assert_eq!(loaded.payable_amount(), Money::from_major(20));
    assert!(store.get_cart(CartId::new()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn materialize_card_order() {
    let store = get_test_store().await;
    let cart = seed(&store, UserId::new()).await;

    let result = store.materialize(card_request(cart.id, "evt_1")).await.unwrap();
    let Materialization::Created { order, backordered } = result else {
        panic!("Expected Created, got {result:?}");
    };

    assert!(backordered.is_empty());
    assert!(order.is_paid());
    assert_eq!(order.total_price(), Money::from_major(25));
    assert_eq!(order.line_items(), cart.items.as_slice());

    let stored = store.get_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.number(), order.number());
    assert_eq!(stored.shipping_address(), &address());
    assert_eq!(stored.payment_reference(), Some("cs_test_1"));

    assert!(store.get_cart(cart.id).await.unwrap().is_none());
    let a = store.stock_level(&ProductId::new("product-a")).await.unwrap().unwrap();
    assert_eq!((a.quantity, a.sold), (8, 2));

    let processed = store.processed_event("evt_1").await.unwrap().unwrap();
    assert_eq!(processed.outcome, EventOutcome::Fulfilled);
    assert_eq!(processed.order_id, Some(order.id()));
}

#[tokio::test]
#[serial]
async fn duplicate_event_is_detected() {
    let store = get_test_store().await;
    let cart = seed(&store, UserId::new()).await;

    store.materialize(card_request(cart.id, "evt_1")).await.unwrap();
    let again = store.materialize(card_request(cart.id, "evt_1")).await.unwrap();

    assert!(matches!(again, Materialization::Duplicate(ref p) if p.event_id == "evt_1"));
    assert_eq!(store.list_orders(OrderQuery::new()).await.unwrap().len(), 1);
    let a = store.stock_level(&ProductId::new("product-a")).await.unwrap().unwrap();
    assert_eq!(a.quantity, 8);
}

#[tokio::test]
#[serial]
async fn concurrent_deliveries_create_one_order() {
    let store = get_test_store().await;
    let cart = seed(&store, UserId::new()).await;

    let attempts = (0..5).map(|_| {
        let store = store.clone();
        let request = card_request(cart.id, "evt_race");
        async move { store.materialize(request).await }
    });
    let results = futures_util::future::join_all(attempts).await;

    let created = results
        .iter()
        .filter(|r| matches!(r, Ok(Materialization::Created { .. })))
        .count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Ok(Materialization::Duplicate(_))))
        .count();
    assert_eq!(created, 1);
    assert_eq!(duplicates, 4);

    let a = store.stock_level(&ProductId::new("product-a")).await.unwrap().unwrap();
    assert_eq!((a.quantity, a.sold), (8, 2));
}

#[tokio::test]
#[serial]
async fn missing_cart_is_recorded_as_anomaly() {
    let store = get_test_store().await;
    let cart_id = CartId::new();

    let result = store.materialize(card_request(cart_id, "evt_9")).await.unwrap();
    assert!(matches!(
        result,
        Materialization::Anomaly(ref a) if a.kind == AnomalyKind::CartMissing
    ));

    let anomalies = store.list_anomalies().await.unwrap();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].event_id.as_deref(), Some("evt_9"));
    assert_eq!(
        store.processed_event("evt_9").await.unwrap().unwrap().outcome,
        EventOutcome::Anomaly
    );
}

#[tokio::test]
#[serial]
async fn unknown_product_is_recorded_as_anomaly() {
    let store = get_test_store().await;
    store.set_stock(StockLevel::new("product-a", 10, 0)).await.unwrap();
    let cart = Cart::new(UserId::new())
        .with_item(LineItem::new("product-a", 1, Money::from_major(10)))
        .with_item(LineItem::new("ghost", 1, Money::from_major(1)));
    store.put_cart(cart.clone()).await.unwrap();

    let result = store.materialize(card_request(cart.id, "evt_2")).await.unwrap();
    assert!(matches!(
        result,
        Materialization::Anomaly(ref a) if a.kind == AnomalyKind::UnknownProduct
    ));

    let anomalies = store.list_anomalies().await.unwrap();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].kind, AnomalyKind::UnknownProduct);
    assert!(anomalies[0].detail.contains("ghost"));
    assert_eq!(
        store.processed_event("evt_2").await.unwrap().unwrap().outcome,
        EventOutcome::Anomaly
    );
    assert!(store.get_cart(cart.id).await.unwrap().is_some());
    assert!(store.find_order_for_cart(cart.id).await.unwrap().is_none());
    let a = store.stock_level(&ProductId::new("product-a")).await.unwrap().unwrap();
    assert_eq!(a.quantity, 10);

    let again = store.materialize(card_request(cart.id, "evt_2")).await.unwrap();
    assert!(matches!(again, Materialization::Duplicate(_)));
}

#[tokio::test]
#[serial]
async fn adjust_rejects_batch_with_unknown_product() {
    let store = get_test_store().await;
    store.set_stock(StockLevel::new("product-a", 10, 0)).await.unwrap();

    let result = store
        .adjust(&[
            InventoryAdjustment::sale(ProductId::new("product-a"), 1),
            InventoryAdjustment::sale(ProductId::new("ghost"), 1),
        ])
        .await;
    assert!(matches!(result, Err(StoreError::UnknownProduct(_))));

    let a = store.stock_level(&ProductId::new("product-a")).await.unwrap().unwrap();
    assert_eq!(a.quantity, 10);
}

#[tokio::test]
#[serial]
async fn cash_order_with_foreign_owner_writes_nothing() {
    let store = get_test_store().await;
    let cart = seed(&store, UserId::new()).await;

    let result = store
        .materialize(MaterializeRequest {
            cart_id: cart.id,
            expected_owner: Some(UserId::new()),
            draft: OrderDraft::cash(address()),
            event: None,
        })
        .await
        .unwrap();

    assert!(matches!(
        result,
        Materialization::Anomaly(ref a) if a.kind == AnomalyKind::OwnerMismatch
    ));
    assert!(store.get_cart(cart.id).await.unwrap().is_some());
    assert!(store.list_anomalies().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn status_updates_and_listing() {
    let store = get_test_store().await;
    let owner = UserId::new();
    let cart = seed(&store, owner).await;

    let result = store
        .materialize(MaterializeRequest {
            cart_id: cart.id,
            expected_owner: Some(owner),
            draft: OrderDraft::cash(address()),
            event: None,
        })
        .await
        .unwrap();
    let Materialization::Created { order, .. } = result else {
        panic!("Expected Created");
    };
    assert!(!order.is_paid());

    let unpaid = store
        .list_orders(OrderQuery::for_owner(owner).paid(false))
        .await
        .unwrap();
    assert_eq!(unpaid.len(), 1);

    let paid = store.update_status(order.id(), StatusChange::Paid).await.unwrap();
    assert!(paid.is_paid() && paid.paid_at().is_some());
    let delivered = store
        .update_status(order.id(), StatusChange::Delivered)
        .await
        .unwrap();
    assert!(delivered.is_delivered());

    let again = store.update_status(order.id(), StatusChange::Delivered).await;
    assert!(matches!(again, Err(StoreError::Order(_))));
    let missing = store.update_status(OrderId::new(), StatusChange::Paid).await;
    assert!(matches!(missing, Err(StoreError::OrderNotFound(_))));

    assert!(store
        .list_orders(OrderQuery::for_owner(UserId::new()))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[serial]
async fn concurrent_adjustments_compose() {
    let store = get_test_store().await;
    store.set_stock(StockLevel::new("p", 100, 0)).await.unwrap();

    let batches = (0..10).map(|_| {
        let store = store.clone();
        async move {
            store
                .adjust(&[InventoryAdjustment::sale(ProductId::new("p"), 4)])
                .await
        }
    });
    for result in futures_util::future::join_all(batches).await {
        result.unwrap();
    }

    let level = store.stock_level(&ProductId::new("p")).await.unwrap().unwrap();
    assert_eq!((level.quantity, level.sold), (60, 40));
}
