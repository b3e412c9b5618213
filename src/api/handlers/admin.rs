use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct PendingNotificationsResponse {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub requests_deleted: u64,
    pub approvals_deleted: u64,
    pub completed_deleted: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Badge count of forward events observed since startup. Best-effort; not a
/// view of the approval table.
pub async fn pending_notifications(
    State(state): State<Arc<AppState>>,
) -> Json<JSend<PendingNotificationsResponse>> {
    JSend::success(PendingNotificationsResponse {
        count: state.badge.count(),
    })
}

pub async fn admin_purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<PurgeResponse>>, ApiError> {
    let stats = state
        .db
        .purge_all()
        .map_err(|e| ApiError::internal(e.to_string()))?;

    tracing::warn!(
        requests = stats.requests,
        approvals = stats.approvals,
        completed = stats.completed,
        "Purged all data"
    );

    Ok(JSend::success(PurgeResponse {
        requests_deleted: stats.requests,
        approvals_deleted: stats.approvals,
        completed_deleted: stats.completed,
    }))
}
