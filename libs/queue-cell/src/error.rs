use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No eligible token to call in session {session_id}")]
    NoEligibleToken { session_id: Uuid },

    #[error("Recall limit exceeded for appointment {appointment_id} (recall count {recall_count})")]
    RecallLimitExceeded {
        appointment_id: Uuid,
        recall_count: i32,
    },

    #[error("Consistency violation: {0}")]
    Consistency(String),

    #[error("Session {session_id} is busy, try again")]
    SessionBusy { session_id: Uuid },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    /// Only lock/version contention is safe to retry blindly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::SessionBusy { .. })
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match &err {
            QueueError::NotFound(_) => AppError::NotFound(err.to_string()),
            QueueError::InvalidState(_) | QueueError::NoEligibleToken { .. } => {
                AppError::BadRequest(err.to_string())
            }
            QueueError::RecallLimitExceeded { .. } => AppError::BadRequest(err.to_string()),
            QueueError::Consistency(_) => AppError::Conflict(err.to_string()),
            QueueError::SessionBusy { .. } => AppError::Busy(err.to_string()),
            QueueError::Unauthorized(_) => AppError::Auth(err.to_string()),
            QueueError::Store(_) | QueueError::Serialization(_) => {
                AppError::Database(err.to_string())
            }
        }
    }
}
