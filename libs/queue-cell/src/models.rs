// libs/queue-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A token may be recalled at most twice; the third attempt always fails.
pub const MAX_RECALLS: i32 = 2;

// ==============================================================================
// SESSION MODEL
// ==============================================================================

/// One working day of a provider's live patient queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub status: SessionStatus,
    /// Token number last actively served or skipped past.
    pub current_token: i32,
    pub max_tokens: Option<i32>,
    pub session_start_time: NaiveTime,
    pub session_end_time: NaiveTime,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_history: Vec<PauseInterval>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency guard checked by the store at save time.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Minutes accumulated in completed pause intervals.
    pub fn total_paused_minutes(&self) -> i64 {
        self.pause_history.iter().map(|p| p.duration_minutes).sum()
    }

    /// Minutes of the pause currently in progress, zero when not paused.
    pub fn in_progress_pause_minutes(&self, now: DateTime<Utc>) -> i64 {
        match self.paused_at {
            Some(paused_at) => (now - paused_at).num_minutes().max(0),
            None => 0,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.status == SessionStatus::Paused
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Live,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: &SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Scheduled, Live) => true,
            (Live, Paused) => true,
            (Paused, Live) => true,
            (Scheduled | Live | Paused, Completed) => true,
            (Scheduled | Live | Paused, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Scheduled => write!(f, "scheduled"),
            SessionStatus::Live => write!(f, "live"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One completed pause/resume cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseInterval {
    pub paused_at: DateTime<Utc>,
    pub resumed_at: DateTime<Utc>,
    pub duration_minutes: i64,
}

// ==============================================================================
// TOKEN MODEL
// ==============================================================================

/// A booked patient slot inside one session's queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueToken {
    pub id: Uuid,
    pub session_id: Uuid,
    pub patient_id: Uuid,
    /// Unique among non-fixed tokens of an active session.
    pub token_number: Option<i32>,
    pub status: TokenStatus,
    pub queue_status: QueueStatus,
    pub recall_count: i32,
    /// Projected clock time, recomputed whenever token_number changes.
    pub time: Option<NaiveTime>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelledBy>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueToken {
    /// Fixed tokens anchor the numbering; their token_number never moves.
    pub fn is_fixed(&self) -> bool {
        self.status.is_fixed()
    }

    /// Whether this token still occupies a position ahead of others for ETA
    /// purposes.
    pub fn counts_toward_eta(&self) -> bool {
        self.status.is_eta_eligible() && !self.queue_status.is_excluded_from_eta()
    }

    pub fn can_recall(&self) -> bool {
        self.recall_count < MAX_RECALLS
    }
}

/// Coarse appointment lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Scheduled,
    Confirmed,
    Called,
    InConsultation,
    Waiting,
    Completed,
    Cancelled,
    NoShow,
}

impl TokenStatus {
    pub fn is_fixed(&self) -> bool {
        matches!(self, TokenStatus::Completed | TokenStatus::Cancelled)
    }

    pub fn is_eta_eligible(&self) -> bool {
        matches!(
            self,
            TokenStatus::Scheduled
                | TokenStatus::Confirmed
                | TokenStatus::Waiting
                | TokenStatus::Called
                | TokenStatus::InConsultation
        )
    }

    /// Statuses call-next may pick from.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            TokenStatus::Scheduled | TokenStatus::Confirmed | TokenStatus::Waiting
        )
    }

    /// Actively being served right now.
    pub fn is_active(&self) -> bool {
        matches!(self, TokenStatus::Called | TokenStatus::InConsultation)
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStatus::Scheduled => write!(f, "scheduled"),
            TokenStatus::Confirmed => write!(f, "confirmed"),
            TokenStatus::Called => write!(f, "called"),
            TokenStatus::InConsultation => write!(f, "in_consultation"),
            TokenStatus::Waiting => write!(f, "waiting"),
            TokenStatus::Completed => write!(f, "completed"),
            TokenStatus::Cancelled => write!(f, "cancelled"),
            TokenStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// Finer-grained scheduler state driving ETA and reordering eligibility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Skipped,
    NoShow,
    Completed,
    Cancelled,
}

impl QueueStatus {
    pub fn is_excluded_from_eta(&self) -> bool {
        matches!(
            self,
            QueueStatus::Skipped
                | QueueStatus::NoShow
                | QueueStatus::Completed
                | QueueStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Doctor,
    System,
}

// ==============================================================================
// SLOT CLASSIFICATION
// ==============================================================================

/// Single-pass partition of a session's tokens used by the skip algorithm:
/// fixed positions are holes the compaction walks around, movable tokens may
/// be renumbered.
#[derive(Debug, Clone)]
pub enum TokenSlot {
    Fixed(i32),
    Movable(QueueToken),
}

impl TokenSlot {
    /// Tokens without a number never participate in numbering.
    pub fn classify(token: QueueToken) -> Option<TokenSlot> {
        let number = token.token_number?;
        if token.is_fixed() {
            Some(TokenSlot::Fixed(number))
        } else {
            Some(TokenSlot::Movable(token))
        }
    }
}

/// Projected clock time for a token slot, wrapping past midnight like any
/// wall clock.
pub fn projected_slot_time(start: NaiveTime, token_number: i32, avg_minutes: i64) -> NaiveTime {
    let offset = Duration::minutes((token_number as i64 - 1).max(0) * avg_minutes);
    start.overflowing_add_signed(offset).0
}

// ==============================================================================
// DERIVED ETA PROJECTION
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtaEntry {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub token_number: i32,
    pub patients_ahead: i64,
    pub estimated_wait_minutes: i64,
    pub estimated_call_time: NaiveTime,
    pub is_paused: bool,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct QueueQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallNextRequest {
    pub session_id: Uuid,
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateQueueStatusRequest {
    pub status: QueueStatusUpdate,
}

/// Statuses a provider may apply through the generic status endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatusUpdate {
    Waiting,
    InConsultation,
    NoShow,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub session: Session,
    pub queue: Vec<QueueEntry>,
    pub current_token: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub appointment: QueueToken,
    pub eta: Option<EtaEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallNextOutcome {
    pub session: Session,
    pub appointment: QueueToken,
    pub etas: Vec<EtaEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkipOutcome {
    pub old_token_number: i32,
    pub new_token_number: i32,
    pub patients_shifted: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallOutcome {
    pub appointment: QueueToken,
    pub recall_count: i32,
    pub can_recall_again: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoShowOutcome {
    pub appointment: QueueToken,
    pub can_reschedule: bool,
}
