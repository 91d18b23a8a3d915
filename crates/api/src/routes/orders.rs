//! Checkout, order and verification endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{CheckoutSession, Verification};
use common::{CartId, OrderId};
use domain::{Order, ShippingAddress};
use serde::{Deserialize, Serialize};
use store::CheckoutStore;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{AdminUser, CurrentUser, Validate, ValidatedJson};

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
}

impl Validate for CheckoutRequest {
    fn validate(&self) -> Result<(), String> {
        self.shipping_address.validate().map_err(|e| e.to_string())
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct SessionResponse {
    pub status: &'static str,
    pub session: CheckoutSession,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub status: &'static str,
    pub data: Order,
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub results: usize,
    pub data: Vec<Order>,
}

// -- Handlers --

/// POST /api/v1/orders/checkout-session/{cart_id}: open a provider payment page.
#[tracing::instrument(skip(state, user, req), fields(user_id = %user.id))]
pub async fn checkout_session<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
    Path(cart_id): Path<String>,
    ValidatedJson(req): ValidatedJson<CheckoutRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let cart_id = parse_cart_id(&cart_id)?;
    let session = state
        .engine
        .create_session(&user.customer(), cart_id, req.shipping_address)
        .await?;

    Ok(Json(SessionResponse {
        status: "success",
        session,
    }))
}

/// POST /api/v1/orders/{cart_id}: place a cash-on-delivery order.
#[tracing::instrument(skip(state, user, req), fields(user_id = %user.id))]
pub async fn create_cash<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
    Path(cart_id): Path<String>,
    ValidatedJson(req): ValidatedJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let cart_id = parse_cart_id(&cart_id)?;
    let order = state
        .engine
        .create_cash_order(user.id, cart_id, req.shipping_address)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderResponse {
            status: "success",
            data: order,
        }),
    ))
}

/// GET /api/v1/orders/verify/{cart_id}: has the cart become an order yet?
#[tracing::instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn verify<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
    Path(cart_id): Path<String>,
) -> Result<Json<Verification>, ApiError> {
    let cart_id = parse_cart_id(&cart_id)?;
    Ok(Json(state.engine.verify_order(user.id, cart_id).await?))
}

/// GET /api/v1/orders: the caller's orders, or all of them for admins.
#[tracing::instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
) -> Result<Json<OrderListResponse>, ApiError> {
    let orders = state.engine.list_orders(user.viewer()).await?;
    Ok(Json(OrderListResponse {
        results: orders.len(),
        data: orders,
    }))
}

/// GET /api/v1/orders/{id}
#[tracing::instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.engine.get_order(user.viewer(), order_id).await?;
    Ok(Json(OrderResponse {
        status: "success",
        data: order,
    }))
}

/// PUT /api/v1/orders/{id}/pay: record cash collected.
#[tracing::instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn mark_paid<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.engine.mark_paid(parse_order_id(&id)?).await?;
    Ok(Json(OrderResponse {
        status: "success",
        data: order,
    }))
}

/// PUT /api/v1/orders/{id}/deliver
#[tracing::instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn mark_delivered<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.engine.mark_delivered(parse_order_id(&id)?).await?;
    Ok(Json(OrderResponse {
        status: "success",
        data: order,
    }))
}

fn parse_cart_id(id: &str) -> Result<CartId, ApiError> {
    CartId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid cart id: {e}")))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}
