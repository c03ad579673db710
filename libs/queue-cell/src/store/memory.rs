use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::{QueueToken, Session};
use crate::store::QueueStore;

/// In-process store used by the test suite and local runs. Mirrors the
/// version CAS the Supabase adapter gets from PostgREST filters.
#[derive(Default)]
pub struct InMemoryQueueStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    tokens: RwLock<HashMap<Uuid, QueueToken>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session directly; booking is outside the scheduler's scope.
    pub async fn put_session(&self, session: Session) {
        self.sessions.write().await.insert(session.id, session);
    }

    pub async fn put_token(&self, token: QueueToken) {
        self.tokens.write().await.insert(token.id, token);
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, QueueError> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn find_session(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Session>, QueueError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.provider_id == provider_id && s.date == date)
            .cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<Session, QueueError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get(&session.id)
            .ok_or_else(|| QueueError::NotFound(format!("session {}", session.id)))?;

        if stored.version != session.version {
            return Err(QueueError::SessionBusy {
                session_id: session.id,
            });
        }

        let mut updated = session.clone();
        updated.version += 1;
        sessions.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn get_token(&self, appointment_id: Uuid) -> Result<Option<QueueToken>, QueueError> {
        Ok(self.tokens.read().await.get(&appointment_id).cloned())
    }

    async fn find_tokens(&self, session_id: Uuid) -> Result<Vec<QueueToken>, QueueError> {
        let mut tokens: Vec<QueueToken> = self
            .tokens
            .read()
            .await
            .values()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.token_number);
        Ok(tokens)
    }

    async fn save_token(&self, token: &QueueToken) -> Result<(), QueueError> {
        self.tokens.write().await.insert(token.id, token.clone());
        Ok(())
    }

    async fn save_tokens(&self, tokens: &[QueueToken]) -> Result<(), QueueError> {
        let mut map = self.tokens.write().await;
        for token in tokens {
            map.insert(token.id, token.clone());
        }
        Ok(())
    }
}
