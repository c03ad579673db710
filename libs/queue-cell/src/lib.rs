pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use error::QueueError;
pub use models::{
    CallNextOutcome, EtaEntry, NoShowOutcome, QueueSnapshot, QueueStatus, QueueToken,
    RecallOutcome, Session, SessionStatus, SkipOutcome, TokenStatus,
};
pub use router::create_queue_router;
pub use services::QueueController;
pub use store::{InMemoryQueueStore, QueueStore, SupabaseQueueStore};
