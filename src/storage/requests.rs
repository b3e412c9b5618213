use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError, RequestError};
use super::models::{
    composite_key, ApprovalRecord, CompletedRecord, NewRequest, RequestFilter, RequestPatch,
    RequestRecord,
};
use super::tables::*;

const COMPLETED_WATERMARK: &str = "completed_watermark";

/// Add a request id to the per-student index
fn index_student(
    write_txn: &WriteTransaction,
    student_id: &str,
    request_id: &str,
) -> Result<(), DatabaseError> {
    let mut student_table = write_txn.open_table(STUDENT_REQUESTS)?;
    let mut request_ids: Vec<String> = student_table
        .get(student_id)?
        .map(|v| rmp_serde::from_slice(v.value()).unwrap_or_default())
        .unwrap_or_default();

    if !request_ids.contains(&request_id.to_string()) {
        request_ids.push(request_id.to_string());
        let data = rmp_serde::to_vec_named(&request_ids)?;
        student_table.insert(student_id, data.as_slice())?;
    }
    Ok(())
}

/// Remove a request id from the per-student index
fn unindex_student(
    write_txn: &WriteTransaction,
    student_id: &str,
    request_id: &str,
) -> Result<(), DatabaseError> {
    let request_ids: Option<Vec<String>> = {
        let student_table = write_txn.open_table(STUDENT_REQUESTS)?;
        let result = match student_table.get(student_id)? {
            Some(data) => Some(rmp_serde::from_slice(data.value())?),
            None => None,
        };
        result
    };

    if let Some(mut ids) = request_ids {
        ids.retain(|rid| rid != request_id);
        let mut student_table = write_txn.open_table(STUDENT_REQUESTS)?;
        if ids.is_empty() {
            student_table.remove(student_id)?;
        } else {
            let data = rmp_serde::to_vec_named(&ids)?;
            student_table.insert(student_id, data.as_slice())?;
        }
    }
    Ok(())
}

/// Remove an active request and its index entries, returning the record.
/// Leaves the caller's transaction uncommitted.
fn take_request(
    write_txn: &WriteTransaction,
    id: &str,
) -> Result<Option<RequestRecord>, DatabaseError> {
    let request: Option<RequestRecord> = {
        let table = write_txn.open_table(REQUESTS)?;
        let result = match table.get(id)? {
            Some(data) => Some(rmp_serde::from_slice(data.value())?),
            None => None,
        };
        result
    };

    let Some(request) = request else {
        return Ok(None);
    };

    {
        let mut table = write_txn.open_table(REQUESTS)?;
        table.remove(id)?;
    }
    {
        let mut keys_table = write_txn.open_table(REQUEST_KEYS)?;
        keys_table.remove(request.composite_key.as_str())?;
    }
    unindex_student(write_txn, &request.student_id, id)?;

    Ok(Some(request))
}

/// Record a transition time so later completions land strictly after it
fn raise_watermark(write_txn: &WriteTransaction, micros: i64) -> Result<(), DatabaseError> {
    let last = {
        let meta = write_txn.open_table(META)?;
        let result = meta.get(COMPLETED_WATERMARK)?.map(|v| v.value());
        result
    };
    if last.is_none() || last.is_some_and(|last| micros > last) {
        let mut meta = write_txn.open_table(META)?;
        meta.insert(COMPLETED_WATERMARK, micros)?;
    }
    Ok(())
}

/// Next completion timestamp: strictly greater than every previously
/// recorded transition, even when the clock stalls or steps backwards.
fn next_completion_time(write_txn: &WriteTransaction) -> Result<DateTime<Utc>, DatabaseError> {
    let last = {
        let meta = write_txn.open_table(META)?;
        let result = meta.get(COMPLETED_WATERMARK)?.map(|v| v.value());
        result
    };

    let now = Utc::now().timestamp_micros();
    let micros = match last {
        Some(last) => now.max(last + 1),
        None => now,
    };

    {
        let mut meta = write_txn.open_table(META)?;
        meta.insert(COMPLETED_WATERMARK, micros)?;
    }

    Ok(DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now))
}

impl Database {
    // ========================================================================
    // Active request operations
    // ========================================================================

    /// Persist a new request unless another active request already holds the
    /// same (student_id, document_type) pair.
    ///
    /// The duplicate check and the insert run in one write transaction; redb
    /// serializes writers, so two racing submissions for the same pair cannot
    /// both pass the check.
    pub fn submit_request(&self, new: NewRequest) -> Result<RequestRecord, RequestError> {
        let key = composite_key(&new.student_id, &new.document_type);
        let write_txn = self.begin_write()?;

        {
            let keys_table = write_txn.open_table(REQUEST_KEYS)?;
            if keys_table.get(key.as_str())?.is_some() {
                // Transaction dropped without commit; nothing is written
                return Err(RequestError::Duplicate(key));
            }
        }

        let now = Utc::now();
        let record = RequestRecord {
            id: uuid::Uuid::new_v4().to_string(),
            composite_key: key,
            created_at: now,
            updated_at: now,
            student_name: new.student_name,
            document_type: new.document_type,
            status: new.status,
            student_id: new.student_id,
            email: new.email,
            request_date: new.request_date,
        };

        {
            let mut table = write_txn.open_table(REQUESTS)?;
            let data = rmp_serde::to_vec_named(&record)?;
            table.insert(record.id.as_str(), data.as_slice())?;

            let mut keys_table = write_txn.open_table(REQUEST_KEYS)?;
            keys_table.insert(record.composite_key.as_str(), record.id.as_str())?;
        }
        index_student(&write_txn, &record.student_id, &record.id)
            .map_err(RequestError::Persistence)?;

        write_txn.commit()?;
        Ok(record)
    }

    /// Get an active request by id
    pub fn get_request(&self, id: &str) -> Result<RequestRecord, RequestError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(REQUESTS)?;

        match table.get(id)? {
            Some(data) => Ok(rmp_serde::from_slice(data.value())?),
            None => Err(RequestError::NotFound(id.to_string())),
        }
    }

    /// List active requests, optionally narrowed by document type and a
    /// case-insensitive search term. No matches is an empty vec, not an error.
    pub fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<RequestRecord>, RequestError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(REQUESTS)?;

        let mut requests = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let request: RequestRecord = rmp_serde::from_slice(value.value())?;
            if filter.matches(&request) {
                requests.push(request);
            }
        }

        Ok(requests)
    }

    /// Get all active requests for a student (exact id match)
    pub fn get_requests_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<RequestRecord>, RequestError> {
        let read_txn = self.begin_read()?;
        let student_table = read_txn.open_table(STUDENT_REQUESTS)?;
        let requests_table = read_txn.open_table(REQUESTS)?;

        let request_ids: Vec<String> = match student_table.get(student_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut requests = Vec::new();
        for request_id in request_ids {
            if let Some(data) = requests_table.get(request_id.as_str())? {
                let request: RequestRecord = rmp_serde::from_slice(data.value())?;
                requests.push(request);
            }
        }

        Ok(requests)
    }

    /// Apply a partial update to an active request.
    ///
    /// The composite key is recomputed whenever student_id or document_type
    /// change, with the same uniqueness rule as submission: colliding with a
    /// different active request fails Duplicate and writes nothing.
    pub fn update_request(
        &self,
        id: &str,
        patch: &RequestPatch,
    ) -> Result<RequestRecord, RequestError> {
        let write_txn = self.begin_write()?;

        let existing: Option<RequestRecord> = {
            let table = write_txn.open_table(REQUESTS)?;
            let result = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };
            result
        };

        let Some(mut request) = existing else {
            return Err(RequestError::NotFound(id.to_string()));
        };

        let old_key = request.composite_key.clone();
        let old_student = request.student_id.clone();

        if let Some(ref name) = patch.student_name {
            request.student_name = name.clone();
        }
        if let Some(ref doc_type) = patch.document_type {
            request.document_type = doc_type.clone();
        }
        if let Some(ref status) = patch.status {
            request.status = status.clone();
        }
        if let Some(ref student_id) = patch.student_id {
            request.student_id = student_id.clone();
        }
        if let Some(ref email) = patch.email {
            request.email = email.clone();
        }
        if let Some(ref request_date) = patch.request_date {
            request.request_date = request_date.clone();
        }

        request.composite_key = composite_key(&request.student_id, &request.document_type);
        request.updated_at = Utc::now();

        // Maintain the composite-key index across the change
        if request.composite_key != old_key {
            let holder: Option<String> = {
                let keys_table = write_txn.open_table(REQUEST_KEYS)?;
                let result = keys_table
                    .get(request.composite_key.as_str())?
                    .map(|v| v.value().to_string());
                result
            };
            if holder.is_some_and(|holder| holder != id) {
                return Err(RequestError::Duplicate(request.composite_key));
            }
            {
                let mut keys_table = write_txn.open_table(REQUEST_KEYS)?;
                keys_table.remove(old_key.as_str())?;
                keys_table.insert(request.composite_key.as_str(), id)?;
            }
        }

        // Maintain the student index across a student_id change
        if request.student_id != old_student {
            unindex_student(&write_txn, &old_student, id).map_err(RequestError::Persistence)?;
            index_student(&write_txn, &request.student_id, id)
                .map_err(RequestError::Persistence)?;
        }

        {
            let serialized = rmp_serde::to_vec_named(&request)?;
            let mut table = write_txn.open_table(REQUESTS)?;
            table.insert(id, serialized.as_slice())?;
        }

        write_txn.commit()?;
        Ok(request)
    }

    /// Delete an active request. A second delete for the same id fails
    /// NotFound; there is no idempotency guarantee.
    pub fn delete_request(&self, id: &str) -> Result<(), RequestError> {
        let write_txn = self.begin_write()?;

        if take_request(&write_txn, id)
            .map_err(RequestError::Persistence)?
            .is_none()
        {
            return Err(RequestError::NotFound(id.to_string()));
        }

        write_txn.commit()?;
        Ok(())
    }

    // ========================================================================
    // Approval operations
    // ========================================================================

    /// Move an active request into the approval stage.
    ///
    /// The removal and the approval insert share one transaction, so a
    /// request is never visible in both stores and never lost between them.
    /// The caller publishes the forward event after this returns.
    pub fn forward_for_approval(&self, id: &str) -> Result<ApprovalRecord, RequestError> {
        let write_txn = self.begin_write()?;

        let Some(request) = take_request(&write_txn, id).map_err(RequestError::Persistence)?
        else {
            return Err(RequestError::NotFound(id.to_string()));
        };

        let approval = ApprovalRecord {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request.id,
            forwarded_at: Utc::now(),
            student_name: request.student_name,
            document_type: request.document_type,
            status: request.status,
            student_id: request.student_id,
            email: request.email,
            request_date: request.request_date,
        };

        {
            let mut table = write_txn.open_table(APPROVALS)?;
            let data = rmp_serde::to_vec_named(&approval)?;
            table.insert(approval.id.as_str(), data.as_slice())?;
        }
        raise_watermark(&write_txn, approval.forwarded_at.timestamp_micros())
            .map_err(RequestError::Persistence)?;

        write_txn.commit()?;
        Ok(approval)
    }

    /// List all pending approvals
    pub fn list_approvals(&self) -> Result<Vec<ApprovalRecord>, RequestError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(APPROVALS)?;

        let mut approvals = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let approval: ApprovalRecord = rmp_serde::from_slice(value.value())?;
            approvals.push(approval);
        }

        Ok(approvals)
    }

    /// Discard a pending approval without completing it
    pub fn decline_approval(&self, id: &str) -> Result<(), RequestError> {
        let write_txn = self.begin_write()?;

        let removed = {
            let mut table = write_txn.open_table(APPROVALS)?;
            let result = table.remove(id)?.is_some();
            result
        };
        if !removed {
            return Err(RequestError::NotFound(id.to_string()));
        }

        write_txn.commit()?;
        Ok(())
    }

    // ========================================================================
    // Completion operations
    // ========================================================================

    /// Mark a request complete. `id` may name a pending approval or an
    /// active request that skipped the approval stage; either way the source
    /// record is removed and a snapshot lands in the completed ledger, all in
    /// one transaction.
    pub fn complete_request(&self, id: &str) -> Result<CompletedRecord, RequestError> {
        let write_txn = self.begin_write()?;

        let approval: Option<ApprovalRecord> = {
            let table = write_txn.open_table(APPROVALS)?;
            let result = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };
            result
        };

        let snapshot = match approval {
            Some(approval) => {
                let mut table = write_txn.open_table(APPROVALS)?;
                table.remove(id)?;
                (
                    approval.request_id,
                    approval.student_name,
                    approval.document_type,
                    approval.status,
                    approval.student_id,
                    approval.email,
                    approval.request_date,
                )
            }
            None => {
                let Some(request) =
                    take_request(&write_txn, id).map_err(RequestError::Persistence)?
                else {
                    return Err(RequestError::NotFound(id.to_string()));
                };
                (
                    request.id,
                    request.student_name,
                    request.document_type,
                    request.status,
                    request.student_id,
                    request.email,
                    request.request_date,
                )
            }
        };

        let completed_at =
            next_completion_time(&write_txn).map_err(RequestError::Persistence)?;
        let (request_id, student_name, document_type, status, student_id, email, request_date) =
            snapshot;
        let completed = CompletedRecord {
            id: uuid::Uuid::new_v4().to_string(),
            request_id,
            completed_at,
            student_name,
            document_type,
            status,
            student_id,
            email,
            request_date,
        };

        {
            let mut table = write_txn.open_table(COMPLETED)?;
            let data = rmp_serde::to_vec_named(&completed)?;
            table.insert(completed.id.as_str(), data.as_slice())?;
        }

        write_txn.commit()?;
        Ok(completed)
    }

    /// List the completed ledger
    pub fn list_completed(&self) -> Result<Vec<CompletedRecord>, RequestError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(COMPLETED)?;

        let mut completed = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let record: CompletedRecord = rmp_serde::from_slice(value.value())?;
            completed.push(record);
        }

        Ok(completed)
    }
}
