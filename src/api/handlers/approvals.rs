use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::storage::models::{ApprovalRecord, CompletedRecord};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub id: String,
    pub request_id: String,
    pub student_name: String,
    pub document_type: String,
    pub status: String,
    pub student_id: String,
    pub email: String,
    pub request_date: String,
    pub forwarded_at: String,
}

#[derive(Debug, Serialize)]
pub struct CompletedResponse {
    pub id: String,
    pub request_id: String,
    pub student_name: String,
    pub document_type: String,
    pub status: String,
    pub student_id: String,
    pub email: String,
    pub request_date: String,
    pub completed_at: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_approvals(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<Vec<ApprovalResponse>>>, ApiError> {
    let approvals = state.db.list_approvals()?;
    Ok(JSend::success(
        approvals.iter().map(approval_to_response).collect(),
    ))
}

pub async fn decline_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.db.decline_approval(&id)?;

    tracing::debug!(approval_id = %id, "Declined approval");
    Ok(JSend::success(()))
}

/// Complete by approval id or by active request id; the repository resolves
/// which stage the record is in.
pub async fn complete_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<CompletedResponse>>, ApiError> {
    let completed = state.db.complete_request(&id)?;

    tracing::debug!(request_id = %completed.request_id, completed_id = %completed.id, "Completed request");
    Ok(JSend::success(completed_to_response(&completed)))
}

pub async fn list_completed(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<Vec<CompletedResponse>>>, ApiError> {
    let completed = state.db.list_completed()?;
    Ok(JSend::success(
        completed.iter().map(completed_to_response).collect(),
    ))
}

// ============================================================================
// Helpers
// ============================================================================

pub(super) fn approval_to_response(approval: &ApprovalRecord) -> ApprovalResponse {
    ApprovalResponse {
        id: approval.id.clone(),
        request_id: approval.request_id.clone(),
        student_name: approval.student_name.clone(),
        document_type: approval.document_type.clone(),
        status: approval.status.clone(),
        student_id: approval.student_id.clone(),
        email: approval.email.clone(),
        request_date: approval.request_date.clone(),
        forwarded_at: approval.forwarded_at.to_rfc3339(),
    }
}

fn completed_to_response(completed: &CompletedRecord) -> CompletedResponse {
    CompletedResponse {
        id: completed.id.clone(),
        request_id: completed.request_id.clone(),
        student_name: completed.student_name.clone(),
        document_type: completed.document_type.clone(),
        status: completed.status.clone(),
        student_id: completed.student_id.clone(),
        email: completed.email.clone(),
        request_date: completed.request_date.clone(),
        completed_at: completed.completed_at.to_rfc3339(),
    }
}
