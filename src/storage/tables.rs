use redb::TableDefinition;

/// Active requests: uuid -> RequestRecord (msgpack)
pub const REQUESTS: TableDefinition<&str, &[u8]> = TableDefinition::new("requests");

/// Duplicate-detection index: composite_key -> request uuid.
/// At most one active request per (student_id, document_type) pair.
pub const REQUEST_KEYS: TableDefinition<&str, &str> = TableDefinition::new("request_keys");

/// Student index: student_id -> msgpack Vec of request UUIDs
pub const STUDENT_REQUESTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("student_requests");

/// Pending approvals: uuid -> ApprovalRecord (msgpack)
pub const APPROVALS: TableDefinition<&str, &[u8]> = TableDefinition::new("approvals");

/// Completed ledger, append-only: uuid -> CompletedRecord (msgpack)
pub const COMPLETED: TableDefinition<&str, &[u8]> = TableDefinition::new("completed");

/// Single-row bookkeeping. Holds the completion timestamp watermark
/// (micros since epoch) under "completed_watermark".
pub const META: TableDefinition<&str, i64> = TableDefinition::new("meta");
