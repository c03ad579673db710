use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::error::QueueError;

/// Per-session exclusive locks. Every mutating queue operation holds its
/// session's lock for the whole read-modify-write body; operations on
/// different sessions run in parallel.
pub struct SessionLockRegistry {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    wait: Duration,
}

impl SessionLockRegistry {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            wait: Duration::from_millis(timeout_ms),
        }
    }

    /// Bounded acquisition: contention past the configured wait fails with
    /// the retryable `SessionBusy` instead of blocking the caller.
    pub async fn acquire(&self, session_id: Uuid) -> Result<OwnedMutexGuard<()>, QueueError> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(session_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        timeout(self.wait, lock.lock_owned()).await.map_err(|_| {
            debug!("Lock acquisition timed out for session {}", session_id);
            QueueError::SessionBusy { session_id }
        })
    }

    /// Drop the registry entry once a session reaches a terminal status.
    /// Guards already handed out stay valid through their own Arc.
    pub async fn evict(&self, session_id: Uuid) {
        self.locks.lock().await.remove(&session_id);
    }
}
