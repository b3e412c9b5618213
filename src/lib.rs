//! request-manager - A unified internal API for student document request
//! tracking and completion file management
//!
//! This crate tracks document requests (transcripts, Form 137, etc.) through
//! a submitted -> pending-approval -> completed workflow with:
//! - Duplicate-submission rejection keyed on (student_id, document_type)
//! - redb embedded database for the request lifecycle (ACID, MVCC, crash-safe)
//! - Swappable object storage backends (local filesystem, GCS) presented as
//!   browsable folders with resolvable download links
//! - A side-channel forward-event feed driving UI badge counts

pub mod api;
pub mod config;
pub mod notify;
pub mod object_store;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use notify::{ForwardFeed, NotificationCounter};
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub object_store: Arc<dyn object_store::ObjectStore>,
    pub feed: Arc<ForwardFeed>,
    /// Badge observer attached at startup
    pub badge: NotificationCounter,
}
