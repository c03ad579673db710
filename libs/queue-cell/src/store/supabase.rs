use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::error::QueueError;
use crate::models::{QueueToken, Session};
use crate::store::QueueStore;

const SESSIONS_TABLE: &str = "queue_sessions";
const TOKENS_TABLE: &str = "queue_tokens";

/// PostgREST-backed store. The version CAS rides on a filter
/// (`id=eq.X&version=eq.N`): a stale write matches no rows and comes back
/// empty, which we surface as `SessionBusy`.
pub struct SupabaseQueueStore {
    client: Arc<SupabaseClient>,
    service_token: Option<String>,
}

impl SupabaseQueueStore {
    pub fn new(client: Arc<SupabaseClient>, service_token: Option<String>) -> Self {
        Self {
            client,
            service_token,
        }
    }

    fn auth(&self) -> Option<&str> {
        self.service_token.as_deref()
    }

    fn to_patch(value: Value) -> Result<Value, QueueError> {
        let mut map = value
            .as_object()
            .cloned()
            .ok_or_else(|| QueueError::Store("row did not serialize to an object".to_string()))?;
        // Identity and creation time never change after insert.
        map.remove("id");
        map.remove("created_at");
        Ok(Value::Object(map))
    }
}

#[async_trait]
impl QueueStore for SupabaseQueueStore {
    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, QueueError> {
        let rows: Vec<Session> = self
            .client
            .rows(SESSIONS_TABLE, &format!("id=eq.{}", session_id), self.auth())
            .await
            .map_err(|e| QueueError::Store(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    async fn find_session(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Session>, QueueError> {
        let filter = format!("provider_id=eq.{}&date=eq.{}", provider_id, date);
        let rows: Vec<Session> = self
            .client
            .rows(SESSIONS_TABLE, &filter, self.auth())
            .await
            .map_err(|e| QueueError::Store(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    async fn save_session(&self, session: &Session) -> Result<Session, QueueError> {
        let mut next = session.clone();
        next.version += 1;

        let patch = Self::to_patch(serde_json::to_value(&next)?)?;
        let filter = format!("id=eq.{}&version=eq.{}", session.id, session.version);

        let updated: Vec<Session> = self
            .client
            .update_rows(SESSIONS_TABLE, &filter, patch, self.auth())
            .await
            .map_err(|e| QueueError::Store(e.to_string()))?;

        match updated.into_iter().next() {
            Some(stored) => Ok(stored),
            None => {
                debug!(
                    "Version guard rejected save for session {} at version {}",
                    session.id, session.version
                );
                Err(QueueError::SessionBusy {
                    session_id: session.id,
                })
            }
        }
    }

    async fn get_token(&self, appointment_id: Uuid) -> Result<Option<QueueToken>, QueueError> {
        let rows: Vec<QueueToken> = self
            .client
            .rows(TOKENS_TABLE, &format!("id=eq.{}", appointment_id), self.auth())
            .await
            .map_err(|e| QueueError::Store(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    async fn find_tokens(&self, session_id: Uuid) -> Result<Vec<QueueToken>, QueueError> {
        let filter = format!("session_id=eq.{}&order=token_number.asc", session_id);
        self.client
            .rows(TOKENS_TABLE, &filter, self.auth())
            .await
            .map_err(|e| QueueError::Store(e.to_string()))
    }

    async fn save_token(&self, token: &QueueToken) -> Result<(), QueueError> {
        let patch = Self::to_patch(serde_json::to_value(token)?)?;
        let filter = format!("id=eq.{}", token.id);

        let updated: Vec<QueueToken> = self
            .client
            .update_rows(TOKENS_TABLE, &filter, patch, self.auth())
            .await
            .map_err(|e| QueueError::Store(e.to_string()))?;

        if updated.is_empty() {
            return Err(QueueError::NotFound(format!("appointment {}", token.id)));
        }
        Ok(())
    }

    async fn save_tokens(&self, tokens: &[QueueToken]) -> Result<(), QueueError> {
        for token in tokens {
            self.save_token(token).await?;
        }
        Ok(())
    }
}
