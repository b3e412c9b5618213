use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize;

    let mut router = Router::new()
        // Active requests
        .route("/requests", get(handlers::list_requests))
        .route("/requests", post(handlers::submit_request))
        .route("/requests/:id", get(handlers::get_request))
        .route("/requests/:id", put(handlers::update_request))
        .route("/requests/:id", delete(handlers::delete_request))
        .route("/requests/:id/forward", post(handlers::forward_request))
        .route("/requests/:id/complete", post(handlers::complete_request))
        .route(
            "/students/:student_id/requests",
            get(handlers::list_student_requests),
        )
        // Approvals and the completed ledger
        .route("/approvals", get(handlers::list_approvals))
        .route("/approvals/:id", delete(handlers::decline_approval))
        .route("/approvals/:id/complete", post(handlers::complete_request))
        .route("/completed", get(handlers::list_completed))
        // Folder views over object storage
        .route("/folders/*folder", get(handlers::list_folder))
        .route(
            "/folders/*folder",
            post(handlers::upload_entry).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/folders/*folder", delete(handlers::delete_entry))
        // Notifications
        .route(
            "/notifications/pending",
            get(handlers::pending_notifications),
        )
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled — purge route is available.");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_state;

    #[tokio::test]
    async fn router_builds_with_test_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        assert!(state.config.test_mode);
        let _router = create_router(state);
    }
}
