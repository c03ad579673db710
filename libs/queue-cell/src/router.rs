use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{
    call_next_handler, get_eta_handler, get_queue_handler, no_show_handler, pause_handler,
    recall_handler, resume_handler, skip_handler, update_queue_status_handler, QueueState,
};

/// Queue routes, nested under `/queue` by the API crate. Every route requires
/// an authenticated provider.
pub fn create_queue_router(config: Arc<AppConfig>, controller: QueueState) -> Router {
    Router::new()
        .route("/", get(get_queue_handler))
        .route("/call-next", post(call_next_handler))
        .route("/pause", post(pause_handler))
        .route("/resume", post(resume_handler))
        .route("/{appointment_id}/skip", patch(skip_handler))
        .route("/{appointment_id}/recall", patch(recall_handler))
        .route("/{appointment_id}/no-show", patch(no_show_handler))
        .route("/{appointment_id}/status", patch(update_queue_status_handler))
        .route("/{appointment_id}/eta", get(get_eta_handler))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(controller)
}
