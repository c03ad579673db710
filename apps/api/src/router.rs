use std::sync::Arc;

use axum::{routing::get, Router};

use queue_cell::router::create_queue_router;
use queue_cell::services::{
    BroadcastPublisher, LoggingNotifier, QueueController, StaticConsultationSettings,
};
use queue_cell::store::SupabaseQueueStore;
use shared_config::AppConfig;
use shared_database::SupabaseClient;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    let supabase = Arc::new(SupabaseClient::new(&state));
    let store = Arc::new(SupabaseQueueStore::new(supabase, None));
    let publisher = Arc::new(BroadcastPublisher::new());
    let notifier = Arc::new(LoggingNotifier);
    let settings = Arc::new(StaticConsultationSettings::new());

    let controller = Arc::new(QueueController::new(
        store,
        publisher,
        notifier,
        settings,
        &state,
    ));

    Router::new()
        .route("/", get(|| async { "Clinic Queue API is running!" }))
        .nest("/queue", create_queue_router(state.clone(), controller))
}
