//! HTTP API server for the checkout engine.
//!
//! Provides the checkout, cash order, verification and order endpoints plus
//! the payment provider webhook, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::CheckoutEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use store::CheckoutStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CheckoutStore> {
    pub engine: CheckoutEngine<S>,
}

impl<S: CheckoutStore> AppState<S> {
    pub fn new(engine: CheckoutEngine<S>) -> Arc<Self> {
        Arc::new(Self { engine })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CheckoutStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/webhook-checkout", post(routes::webhook::checkout::<S>))
        .route("/api/v1/orders", get(routes::orders::list::<S>))
        .route(
            "/api/v1/orders/checkout-session/{cart_id}",
            post(routes::orders::checkout_session::<S>),
        )
        .route(
            "/api/v1/orders/verify/{cart_id}",
            get(routes::orders::verify::<S>),
        )
        // Cash orders are posted against a cart id; reads address an order id.
        .route(
            "/api/v1/orders/{id}",
            get(routes::orders::get::<S>).post(routes::orders::create_cash::<S>),
        )
        .route("/api/v1/orders/{id}/pay", put(routes::orders::mark_paid::<S>))
        .route(
            "/api/v1/orders/{id}/deliver",
            put(routes::orders::mark_delivered::<S>),
        )
        .route(
            "/api/v1/admin/anomalies",
            get(routes::admin::anomalies::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
