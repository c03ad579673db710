use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::{QueueToken, Session};

mod memory;
mod supabase;

pub use memory::InMemoryQueueStore;
pub use supabase::SupabaseQueueStore;

/// Persistence contract for the scheduler. Implementations must give
/// read-your-writes consistency within one controller call; the controller
/// provides the serialization across calls.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, QueueError>;

    async fn find_session(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Session>, QueueError>;

    /// Persist the session with a compare-and-swap on `version`. A stale
    /// version fails with `SessionBusy`; the stored copy comes back with the
    /// version advanced.
    async fn save_session(&self, session: &Session) -> Result<Session, QueueError>;

    async fn get_token(&self, appointment_id: Uuid) -> Result<Option<QueueToken>, QueueError>;

    /// All tokens of a session, ordered by token number ascending.
    async fn find_tokens(&self, session_id: Uuid) -> Result<Vec<QueueToken>, QueueError>;

    async fn save_token(&self, token: &QueueToken) -> Result<(), QueueError>;

    async fn save_tokens(&self, tokens: &[QueueToken]) -> Result<(), QueueError>;
}
