// src/server/handlers/admin.rs
//! Operational endpoints

use crate::server::{MetricsSnapshot, ServerState};
use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    /// Bundles currently published in the local store
    pub local_bundles: Option<usize>,
    /// Hydration requests that joined an in-flight pull
    pub hydrations_coalesced: u64,
    pub remote: String,
}

/// GET /admin/stats
pub async fn stats(State(state): State<Arc<ServerState>>) -> Json<StatsResponse> {
    let store = state.store.clone();
    let local_bundles = match tokio::task::spawn_blocking(move || store.list()).await {
        Ok(Ok(ids)) => Some(ids.len()),
        Ok(Err(e)) => {
            tracing::warn!("Failed to list local bundles: {}", e);
            None
        }
        Err(e) => {
            tracing::warn!("Bundle listing task failed: {}", e);
            None
        }
    };

    Json(StatsResponse {
        metrics: state.metrics.snapshot(),
        local_bundles,
        hydrations_coalesced: state.hydrator.coalesced_count(),
        remote: state.remote.name().to_string(),
    })
}
