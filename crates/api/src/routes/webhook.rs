//! Payment provider notifications.
//!
//! The handler takes the body as raw bytes: the signature covers the exact
//! bytes sent, so nothing may decode and re-encode them first.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Serialize;
use store::CheckoutStore;

use crate::AppState;
use crate::error::ApiError;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: &'static str,
}

/// POST /webhook-checkout
///
/// Every handled outcome is a 200 so the provider stops redelivering.
/// Errors are returned only when nothing was committed.
pub async fn checkout<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .engine
        .process_notification(&body, signature)
        .await?;

    Ok(Json(WebhookResponse {
        received: true,
        outcome: outcome.as_str(),
    }))
}
