use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derive the duplicate-detection key for a request.
/// Only one *active* request may hold a given key at a time.
pub fn composite_key(student_id: &str, document_type: &str) -> String {
    format!("{student_id}_{document_type}")
}

/// An active document request stored in redb
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    // System fields
    pub id: String,
    /// Derived from student_id + document_type at write time; never
    /// caller-supplied.
    pub composite_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Caller-supplied fields
    pub student_name: String,
    pub document_type: String,
    pub status: String,
    pub student_id: String,
    pub email: String,
    /// Display date as entered on the request form. Searched as text,
    /// never parsed.
    pub request_date: String,
}

/// Fields accepted when a request is submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRequest {
    pub student_name: String,
    pub document_type: String,
    pub status: String,
    pub student_id: String,
    pub email: String,
    pub request_date: String,
}

/// Partial update for an active request. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestPatch {
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub request_date: Option<String>,
}

impl RequestPatch {
    pub fn is_empty(&self) -> bool {
        self.student_name.is_none()
            && self.document_type.is_none()
            && self.status.is_none()
            && self.student_id.is_none()
            && self.email.is_none()
            && self.request_date.is_none()
    }
}

/// Narrowing criteria for listing active requests
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    /// Exact document_type match (e.g. "Form 137")
    pub document_type: Option<String>,
    /// Case-insensitive substring over student_name, status and request_date
    pub search: Option<String>,
}

impl RequestFilter {
    pub fn matches(&self, req: &RequestRecord) -> bool {
        if let Some(ref doc_type) = self.document_type {
            if req.document_type != *doc_type {
                return false;
            }
        }
        match self.search.as_deref() {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                req.student_name.to_lowercase().contains(&term)
                    || req.status.to_lowercase().contains(&term)
                    || req.request_date.to_lowercase().contains(&term)
            }
        }
    }
}

/// A request forwarded to the principal for approval. Carries a copy of the
/// request fields; the composite key does not follow the record out of the
/// active set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: String,
    /// Id the request held while active, kept for audit trails
    pub request_id: String,
    pub forwarded_at: DateTime<Utc>,

    pub student_name: String,
    pub document_type: String,
    pub status: String,
    pub student_id: String,
    pub email: String,
    pub request_date: String,
}

/// Immutable snapshot appended when a request is marked complete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedRecord {
    pub id: String,
    pub request_id: String,
    /// Server-assigned, strictly monotonic per write
    pub completed_at: DateTime<Utc>,

    pub student_name: String,
    pub document_type: String,
    pub status: String,
    pub student_id: String,
    pub email: String,
    pub request_date: String,
}
