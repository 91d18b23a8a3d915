//! The checkout and fulfillment engine.

use std::sync::Arc;

use chrono::Utc;
use common::{CartId, OrderId, UserId};
use domain::{CheckoutState, Order, OrderDraft, ShippingAddress};
use serde::Serialize;
use store::{
    AnomalyKind, AnomalyRecord, CheckoutStore, Materialization, MaterializeRequest, OrderQuery,
    PaymentEventRef, ProcessedEvent, StatusChange, StoreError,
};

use crate::error::{CheckoutError, Result};
use crate::event::PaymentEvent;
use crate::gateway::{CheckoutSession, PaymentGateway, SessionRequest};
use crate::signature::SignatureVerifier;

/// Provider-facing settings for new sessions.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// ISO currency code sent to the provider, lowercase.
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutSettings {
    /// Derives redirect targets from the storefront URL: `/success` after
    /// payment, `/cart` on cancel.
    pub fn for_frontend(frontend_url: &str, currency: impl Into<String>) -> Self {
        let base = frontend_url.trim_end_matches('/');
        Self {
            currency: currency.into(),
            success_url: format!("{base}/success"),
            cancel_url: format!("{base}/cart"),
        }
    }
}

/// The authenticated shopper starting a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: UserId,
    pub email: String,
}

/// Whose orders a read may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Customer(UserId),
    Admin,
}

impl Viewer {
    fn can_see(&self, order: &Order) -> bool {
        match self {
            Viewer::Customer(user) => order.owner() == *user,
            Viewer::Admin => true,
        }
    }
}

/// How a payment notification was handled. Every variant is acknowledged.
#[derive(Debug, Clone)]
pub enum NotificationOutcome {
    /// An order was created.
    Fulfilled(Order),
    /// The event id was already processed; nothing happened.
    Duplicate(ProcessedEvent),
    /// The event kind does not trigger fulfillment.
    Ignored { kind: String },
    /// The cart could not become an order; the anomaly was recorded.
    Anomaly(AnomalyRecord),
}

impl NotificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationOutcome::Fulfilled(_) => "fulfilled",
            NotificationOutcome::Duplicate(_) => "duplicate",
            NotificationOutcome::Ignored { .. } => "ignored",
            NotificationOutcome::Anomaly(_) => "anomaly",
        }
    }
}

/// Answer to "did my payment go through?" after the provider redirect.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub order_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    pub cart_exists: bool,
    pub state: CheckoutState,
}

impl Verification {
    fn new(order: Option<Order>, cart_exists: bool) -> Self {
        let state = match (&order, cart_exists) {
            (Some(_), _) => CheckoutState::Fulfilled,
            (None, true) => CheckoutState::Initiated,
            (None, false) => CheckoutState::Abandoned,
        };
        Self {
            order_exists: order.is_some(),
            order,
            cart_exists,
            state,
        }
    }
}

/// Converts carts into orders, either through the payment provider or
/// directly for cash on delivery.
pub struct CheckoutEngine<S: CheckoutStore> {
    store: S,
    gateway: Arc<dyn PaymentGateway>,
    verifier: SignatureVerifier,
    settings: CheckoutSettings,
}

impl<S: CheckoutStore + Clone> Clone for CheckoutEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            gateway: Arc::clone(&self.gateway),
            verifier: self.verifier.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: CheckoutStore> CheckoutEngine<S> {
    /// Creates a new engine.
    pub fn new(
        store: S,
        gateway: Arc<dyn PaymentGateway>,
        verifier: SignatureVerifier,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            verifier,
            settings,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Opens a provider payment session for the caller's cart.
    ///
    /// Read-only: nothing is written until the provider reports payment.
    #[tracing::instrument(skip(self, customer, address), fields(user_id = %customer.id))]
    pub async fn create_session(
        &self,
        customer: &Customer,
        cart_id: CartId,
        address: ShippingAddress,
    ) -> Result<CheckoutSession> {
        address.validate()?;

        let cart = match self.store.get_cart(cart_id).await? {
            Some(cart) if cart.is_owned_by(customer.id) => cart,
            _ => {
                return Err(CheckoutError::InvalidState(format!(
                    "No cart {cart_id} for this user"
                )));
            }
        };
        if cart.is_empty() {
            return Err(CheckoutError::InvalidState(format!("Cart {cart_id} is empty")));
        }

        let mut metadata = address.to_metadata();
        metadata.insert("cart_id".to_string(), cart_id.to_string());

        let request = SessionRequest {
            cart_id,
            amount: cart.payable_amount(),
            currency: self.settings.currency.clone(),
            customer_email: customer.email.clone(),
            description: format!("Order for {}", customer.email),
            metadata,
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
        };

        let session = self.gateway.create_session(&request).await?;

        metrics::counter!("checkout_sessions_created_total").increment(1);
        tracing::info!(session_id = %session.id, amount = %request.amount, "Checkout session created");
        Ok(session)
    }

    /// Handles one payment notification.
    ///
    /// `payload` must be the raw request body, untouched. Returns an error
    /// only when the sender should be told the notification failed: a bad
    /// signature or payload (no side effects) or a store failure (nothing
    /// committed, redelivery is safe).
    #[tracing::instrument(
        skip_all,
        fields(event_id = tracing::field::Empty, cart_id = tracing::field::Empty)
    )]
    pub async fn process_notification(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<NotificationOutcome> {
        if let Err(e) = self.verifier.verify(payload, signature) {
            metrics::counter!("webhook_signature_failures_total").increment(1);
            tracing::warn!(error = %e, "Rejected payment notification");
            return Err(e.into());
        }

        let event = PaymentEvent::parse(payload)?;
        let span = tracing::Span::current();
        span.record("event_id", event.id.as_str());
        metrics::counter!("payment_events_received_total", "kind" => event.kind.clone())
            .increment(1);

        if !event.is_checkout_completed() {
            tracing::debug!(kind = %event.kind, "Ignoring payment event kind");
            return Ok(NotificationOutcome::Ignored { kind: event.kind });
        }

        let session = event.completed_session()?;
        span.record("cart_id", tracing::field::display(session.cart_id));

        let started = std::time::Instant::now();
        let state = CheckoutState::Initiated.transition(CheckoutState::Paid)?;

        let request = MaterializeRequest {
            cart_id: session.cart_id,
            expected_owner: None,
            draft: OrderDraft::card(
                session.shipping_address,
                session.amount_total,
                Utc::now(),
                session.session_id,
            ),
            event: Some(PaymentEventRef {
                event_id: event.id.clone(),
                event_type: event.kind.clone(),
            }),
        };

        let outcome = match self.store.materialize(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Fulfillment failed before commit; awaiting redelivery");
                return Err(e.into());
            }
        };

        match outcome {
            Materialization::Created { order, backordered } => {
                let state = state.transition(CheckoutState::Fulfilled)?;
                self.record_created(&order, &backordered);
                metrics::histogram!("fulfillment_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id(),
                    order_number = order.number(),
                    total = %order.total_price(),
                    customer_email = session.customer_email.as_deref().unwrap_or(""),
                    %state,
                    "Order fulfilled from payment"
                );
                Ok(NotificationOutcome::Fulfilled(order))
            }
            Materialization::Duplicate(processed) => {
                metrics::counter!("payment_events_duplicate_total").increment(1);
                tracing::info!(
                    outcome = processed.outcome.as_str(),
                    order_id = ?processed.order_id,
                    "Duplicate payment event acknowledged"
                );
                Ok(NotificationOutcome::Duplicate(processed))
            }
            Materialization::Anomaly(anomaly) => {
                let state = state.transition(CheckoutState::Abandoned)?;
                metrics::counter!("fulfillment_anomalies_total", "kind" => anomaly.kind.as_str())
                    .increment(1);
                tracing::error!(
                    anomaly_id = %anomaly.id,
                    kind = %anomaly.kind,
                    detail = %anomaly.detail,
                    %state,
                    "Paid event could not be fulfilled; needs reconciliation"
                );
                Ok(NotificationOutcome::Anomaly(anomaly))
            }
        }
    }

    /// Creates an unpaid cash-on-delivery order from the caller's cart.
    #[tracing::instrument(skip(self, address))]
    pub async fn create_cash_order(
        &self,
        user: UserId,
        cart_id: CartId,
        address: ShippingAddress,
    ) -> Result<Order> {
        address.validate()?;

        let request = MaterializeRequest {
            cart_id,
            expected_owner: Some(user),
            draft: OrderDraft::cash(address),
            event: None,
        };

        match self.store.materialize(request).await? {
            Materialization::Created { order, backordered } => {
                self.record_created(&order, &backordered);
                tracing::info!(
                    order_id = %order.id(),
                    order_number = order.number(),
                    total = %order.total_price(),
                    "Cash order created"
                );
                Ok(order)
            }
            Materialization::Anomaly(anomaly) => match anomaly.kind {
                AnomalyKind::EmptyCart | AnomalyKind::UnknownProduct => {
                    Err(CheckoutError::InvalidState(anomaly.detail))
                }
                AnomalyKind::CartMissing | AnomalyKind::OwnerMismatch => Err(
                    CheckoutError::NotFound(format!("No cart {cart_id} for this user")),
                ),
            },
            Materialization::Duplicate(_) => Err(CheckoutError::Store(StoreError::Corrupt(
                "duplicate reported for a request without an event".to_string(),
            ))),
        }
    }

    /// Reports whether the caller's cart has become an order yet.
    #[tracing::instrument(skip(self))]
    pub async fn verify_order(&self, user: UserId, cart_id: CartId) -> Result<Verification> {
        // Cart before order: a fulfillment committing between the two reads
        // then shows up as an order, never as a vanished cart.
        let cart_exists = self
            .store
            .get_cart(cart_id)
            .await?
            .is_some_and(|c| c.is_owned_by(user));
        let order = self
            .store
            .find_order_for_cart(cart_id)
            .await?
            .filter(|o| o.owner() == user);

        Ok(Verification::new(order, cart_exists))
    }

    /// Lists orders visible to `viewer`, newest first.
    pub async fn list_orders(&self, viewer: Viewer) -> Result<Vec<Order>> {
        let query = match viewer {
            Viewer::Customer(user) => OrderQuery::for_owner(user),
            Viewer::Admin => OrderQuery::new(),
        };
        Ok(self.store.list_orders(query).await?)
    }

    /// Returns one order if `viewer` may see it.
    pub async fn get_order(&self, viewer: Viewer, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .filter(|o| viewer.can_see(o))
            .ok_or_else(|| CheckoutError::NotFound(format!("Order {order_id}")))
    }

    /// Records cash collected for an order.
    #[tracing::instrument(skip(self))]
    pub async fn mark_paid(&self, order_id: OrderId) -> Result<Order> {
        let order = self.store.update_status(order_id, StatusChange::Paid).await?;
        tracing::info!(order_number = order.number(), "Order marked paid");
        Ok(order)
    }

    /// Records delivery of an order.
    #[tracing::instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .update_status(order_id, StatusChange::Delivered)
            .await?;
        tracing::info!(order_number = order.number(), "Order marked delivered");
        Ok(order)
    }

    /// Lists fulfillments awaiting operator reconciliation.
    pub async fn list_anomalies(&self) -> Result<Vec<AnomalyRecord>> {
        Ok(self.store.list_anomalies().await?)
    }

    fn record_created(&self, order: &Order, backordered: &[domain::ProductId]) {
        metrics::counter!(
            "orders_created_total",
            "payment_method" => order.payment_method().as_str()
        )
        .increment(1);

        if !backordered.is_empty() {
            metrics::counter!("inventory_backorders_total").increment(backordered.len() as u64);
            tracing::warn!(
                order_id = %order.id(),
                products = ?backordered,
                "Order oversold stock; products are backordered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryPaymentGateway;
    use domain::{Cart, LineItem, Money};
    use store::{CartStore, InMemoryStore};

    fn engine() -> (CheckoutEngine<InMemoryStore>, InMemoryPaymentGateway) {
        let gateway = InMemoryPaymentGateway::new();
        let engine = CheckoutEngine::new(
            InMemoryStore::new(),
            Arc::new(gateway.clone()),
            SignatureVerifier::new("whsec_test"),
            CheckoutSettings::for_frontend("http://localhost:5173/", "egp"),
        );
        (engine, gateway)
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            details: "12 Nile St".to_string(),
            city: "Cairo".to_string(),
            phone: Some("0100000000".to_string()),
            postal_code: None,
        }
    }

    #[test]
    fn test_settings_for_frontend() {
        let settings = CheckoutSettings::for_frontend("https://shop.example/", "egp");
        assert_eq!(settings.success_url, "https://shop.example/success");
        assert_eq!(settings.cancel_url, "https://shop.example/cart");
    }

    #[tokio::test]
    async fn test_session_uses_discounted_total_and_round_trips_cart_id() {
        let (engine, gateway) = engine();
        let customer = Customer {
            id: UserId::new(),
            email: "buyer@example.com".to_string(),
        };
        let cart = Cart::new(customer.id)
            .with_item(LineItem::new("product-a", 2, Money::from_major(10)))
            .with_discounted_total(Money::from_major(18));
        engine.store().put_cart(cart.clone()).await.unwrap();

        let session = engine
            .create_session(&customer, cart.id, address())
            .await
            .unwrap();
        assert!(session.url.contains(&session.id));

        let requests = gateway.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.amount, Money::from_major(18));
        assert_eq!(request.cart_id, cart.id);
        assert_eq!(request.customer_email, "buyer@example.com");
        assert_eq!(request.metadata.get("cart_id"), Some(&cart.id.to_string()));
        assert_eq!(request.metadata.get("city").map(String::as_str), Some("Cairo"));
        assert_eq!(request.success_url, "http://localhost:5173/success");

        assert!(engine.store().get_cart(cart.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_session_preconditions() {
        let (engine, gateway) = engine();
        let customer = Customer {
            id: UserId::new(),
            email: "buyer@example.com".to_string(),
        };

        let missing = engine
            .create_session(&customer, CartId::new(), address())
            .await;
        assert!(matches!(missing, Err(CheckoutError::InvalidState(_))));

        let empty = Cart::new(customer.id);
        engine.store().put_cart(empty.clone()).await.unwrap();
        let result = engine.create_session(&customer, empty.id, address()).await;
        assert!(matches!(result, Err(CheckoutError::InvalidState(_))));

        let foreign = Cart::new(UserId::new())
            .with_item(LineItem::new("product-a", 1, Money::from_major(10)));
        engine.store().put_cart(foreign.clone()).await.unwrap();
        let result = engine.create_session(&customer, foreign.id, address()).await;
        assert!(matches!(result, Err(CheckoutError::InvalidState(_))));

        let result = engine
            .create_session(&customer, foreign.id, ShippingAddress::default())
            .await;
        assert!(matches!(result, Err(CheckoutError::MalformedPayload(_))));

        assert!(gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failure_surfaces() {
        let (engine, gateway) = engine();
        let customer = Customer {
            id: UserId::new(),
            email: "buyer@example.com".to_string(),
        };
        let cart = Cart::new(customer.id)
            .with_item(LineItem::new("product-a", 1, Money::from_major(10)));
        engine.store().put_cart(cart.clone()).await.unwrap();

        gateway.set_fail_on_create(true);
        let result = engine.create_session(&customer, cart.id, address()).await;
        assert!(matches!(result, Err(CheckoutError::Gateway(_))));
    }

    #[tokio::test]
    async fn test_verification_states() {
        let (engine, _) = engine();
        let user = UserId::new();

        let nothing = engine.verify_order(user, CartId::new()).await.unwrap();
        assert!(!nothing.order_exists && !nothing.cart_exists);
        assert_eq!(nothing.state, CheckoutState::Abandoned);

        let cart = Cart::new(user).with_item(LineItem::new("product-a", 1, Money::from_major(10)));
        engine.store().put_cart(cart.clone()).await.unwrap();
        let pending = engine.verify_order(user, cart.id).await.unwrap();
        assert!(pending.cart_exists && !pending.order_exists);
        assert_eq!(pending.state, CheckoutState::Initiated);

        let stranger = engine.verify_order(UserId::new(), cart.id).await.unwrap();
        assert!(!stranger.cart_exists);

        let json = serde_json::to_value(&pending).unwrap();
        assert_eq!(json["orderExists"], false);
        assert_eq!(json["cartExists"], true);
        assert!(json.get("order").is_none());
    }

    #[test]
    fn test_viewer_visibility() {
        let owner = UserId::new();
        let cart = Cart::new(owner).with_item(LineItem::new("p", 1, Money::from_cents(100)));
        let order = Order::from_cart(
            OrderId::new(),
            1,
            &cart,
            &OrderDraft::cash(address()),
            Utc::now(),
        )
        .unwrap();

        assert!(Viewer::Customer(owner).can_see(&order));
        assert!(!Viewer::Customer(UserId::new()).can_see(&order));
        assert!(Viewer::Admin.can_see(&order));
    }
}
