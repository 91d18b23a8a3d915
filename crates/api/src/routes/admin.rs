//! Operator endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use store::{AnomalyRecord, CheckoutStore};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::AdminUser;

#[derive(Serialize)]
pub struct AnomalyListResponse {
    pub results: usize,
    pub data: Vec<AnomalyRecord>,
}

/// GET /api/v1/admin/anomalies: paid events that could not be fulfilled.
#[tracing::instrument(skip_all)]
pub async fn anomalies<S: CheckoutStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<AnomalyListResponse>, ApiError> {
    let anomalies = state.engine.list_anomalies().await?;
    Ok(Json(AnomalyListResponse {
        results: anomalies.len(),
        data: anomalies,
    }))
}
