// Pure ETA projection over a session snapshot. No store access, no side
// effects; the controller feeds it post-mutation state.
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{EtaEntry, QueueStatus, QueueToken, Session};

/// One entry per waiting token. Tokens without a token number are skipped
/// rather than failing the whole projection.
pub fn compute_etas(
    session: &Session,
    tokens: &[QueueToken],
    avg_minutes: i64,
    now: DateTime<Utc>,
) -> Vec<EtaEntry> {
    let mut etas: Vec<EtaEntry> = tokens
        .iter()
        .filter(|t| t.queue_status == QueueStatus::Waiting)
        .filter_map(|t| eta_for_token(session, tokens, t, avg_minutes, now))
        .collect();
    etas.sort_by_key(|e| e.token_number);
    etas
}

/// Projection for a single token regardless of its queue status; used by the
/// skip/recall paths and the per-appointment ETA endpoint.
pub fn compute_eta_for(
    session: &Session,
    tokens: &[QueueToken],
    appointment_id: Uuid,
    avg_minutes: i64,
    now: DateTime<Utc>,
) -> Option<EtaEntry> {
    let token = tokens.iter().find(|t| t.id == appointment_id)?;
    eta_for_token(session, tokens, token, avg_minutes, now)
}

fn eta_for_token(
    session: &Session,
    tokens: &[QueueToken],
    token: &QueueToken,
    avg_minutes: i64,
    now: DateTime<Utc>,
) -> Option<EtaEntry> {
    let token_number = token.token_number?;

    let patients_ahead = tokens
        .iter()
        .filter(|other| other.id != token.id && other.counts_toward_eta())
        .filter(|other| matches!(other.token_number, Some(n) if n < token_number))
        .count() as i64;

    let is_paused = session.is_paused();
    // While paused the estimate is held constant; the projected call time
    // still absorbs every paused minute so it stays realistic after resume.
    let pause_minutes =
        session.total_paused_minutes() + session.in_progress_pause_minutes(now);

    let estimated_wait_minutes = patients_ahead * avg_minutes;
    let estimated_call_time = session
        .session_start_time
        .overflowing_add_signed(Duration::minutes(
            patients_ahead * avg_minutes + pause_minutes,
        ))
        .0;

    Some(EtaEntry {
        appointment_id: token.id,
        patient_id: token.patient_id,
        token_number,
        patients_ahead,
        estimated_wait_minutes,
        estimated_call_time,
        is_paused,
    })
}
