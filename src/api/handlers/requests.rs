use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::notify::ForwardEvent;
use crate::storage::models::{NewRequest, RequestFilter, RequestPatch, RequestRecord};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub id: String,
    pub student_name: String,
    pub document_type: String,
    pub status: String,
    pub student_id: String,
    pub email: String,
    pub request_date: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ListRequestsParams {
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn submit_request(
    State(state): State<Arc<AppState>>,
    AppJson(new): AppJson<NewRequest>,
) -> Result<Json<JSend<RequestResponse>>, ApiError> {
    if new.student_id.trim().is_empty() {
        return Err(ApiError::bad_request("student_id must not be empty"));
    }
    if new.document_type.trim().is_empty() {
        return Err(ApiError::bad_request("document_type must not be empty"));
    }

    let record = state.db.submit_request(new)?;

    tracing::debug!(request_id = %record.id, composite_key = %record.composite_key, "Submitted request");
    Ok(JSend::success(request_to_response(&record)))
}

pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListRequestsParams>,
) -> Result<Json<JSend<Vec<RequestResponse>>>, ApiError> {
    let filter = RequestFilter {
        document_type: params.document_type,
        search: params.search,
    };

    let requests = state.db.list_requests(&filter)?;
    Ok(JSend::success(
        requests.iter().map(request_to_response).collect(),
    ))
}

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<RequestResponse>>, ApiError> {
    let record = state.db.get_request(&id)?;
    Ok(JSend::success(request_to_response(&record)))
}

pub async fn list_student_requests(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
) -> Result<Json<JSend<Vec<RequestResponse>>>, ApiError> {
    let requests = state.db.get_requests_by_student(&student_id)?;
    Ok(JSend::success(
        requests.iter().map(request_to_response).collect(),
    ))
}

pub async fn update_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(patch): AppJson<RequestPatch>,
) -> Result<Json<JSend<RequestResponse>>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::bad_request(
            "at least one field (student_name, document_type, status, student_id, email, request_date) must be provided",
        ));
    }

    let record = state.db.update_request(&id, &patch)?;

    tracing::debug!(request_id = %id, "Updated request");
    Ok(JSend::success(request_to_response(&record)))
}

/// Deletion is unconditional here; any are-you-sure gating belongs to the
/// calling interface.
pub async fn delete_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.db.delete_request(&id)?;

    tracing::debug!(request_id = %id, "Deleted request");
    Ok(JSend::success(()))
}

pub async fn forward_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<super::approvals::ApprovalResponse>>, ApiError> {
    let approval = state.db.forward_for_approval(&id)?;

    // Publish only after the transition committed
    state.feed.publish(ForwardEvent {
        request_id: approval.request_id.clone(),
        document_type: approval.document_type.clone(),
        forwarded_at: approval.forwarded_at,
    });

    tracing::debug!(request_id = %id, approval_id = %approval.id, "Forwarded request for approval");
    Ok(JSend::success(super::approvals::approval_to_response(
        &approval,
    )))
}

// ============================================================================
// Helpers
// ============================================================================

pub(super) fn request_to_response(record: &RequestRecord) -> RequestResponse {
    RequestResponse {
        id: record.id.clone(),
        student_name: record.student_name.clone(),
        document_type: record.document_type.clone(),
        status: record.status.clone(),
        student_id: record.student_id.clone(),
        email: record.email.clone(),
        request_date: record.request_date.clone(),
        created_at: record.created_at.to_rfc3339(),
        updated_at: record.updated_at.to_rfc3339(),
    }
}
