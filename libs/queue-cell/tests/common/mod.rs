#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use queue_cell::models::{
    projected_slot_time, QueueStatus, QueueToken, Session, SessionStatus, TokenStatus,
};
use queue_cell::services::{
    BroadcastPublisher, LoggingNotifier, QueueController, StaticConsultationSettings,
};
use queue_cell::store::InMemoryQueueStore;
use queue_cell::QueueStore;
use shared_config::AppConfig;

pub const AVG_MINUTES: i64 = 20;

pub fn test_config() -> AppConfig {
    AppConfig {
        supabase_url: String::new(),
        supabase_anon_key: String::new(),
        supabase_jwt_secret: String::new(),
        default_consultation_minutes: AVG_MINUTES,
        session_lock_timeout_ms: 200,
    }
}

pub struct Harness {
    pub store: Arc<InMemoryQueueStore>,
    pub controller: QueueController,
    pub settings: Arc<StaticConsultationSettings>,
    pub provider_id: Uuid,
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemoryQueueStore::new());
    let settings = Arc::new(StaticConsultationSettings::new());
    let controller = QueueController::new(
        store.clone(),
        Arc::new(BroadcastPublisher::new()),
        Arc::new(LoggingNotifier),
        settings.clone(),
        &test_config(),
    );
    Harness {
        store,
        controller,
        settings,
        provider_id: Uuid::new_v4(),
    }
}

pub fn session_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

pub fn session_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap()
}

pub fn live_session(provider_id: Uuid) -> Session {
    let now = Utc::now();
    Session {
        id: Uuid::new_v4(),
        provider_id,
        date: session_date(),
        status: SessionStatus::Live,
        current_token: 0,
        max_tokens: Some(30),
        session_start_time: session_start(),
        session_end_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        paused_at: None,
        pause_history: Vec::new(),
        started_at: Some(now),
        ended_at: None,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

pub fn waiting_token(session: &Session, token_number: i32) -> QueueToken {
    let now = Utc::now();
    QueueToken {
        id: Uuid::new_v4(),
        session_id: session.id,
        patient_id: Uuid::new_v4(),
        token_number: Some(token_number),
        status: TokenStatus::Waiting,
        queue_status: QueueStatus::Waiting,
        recall_count: 0,
        time: Some(projected_slot_time(
            session.session_start_time,
            token_number,
            AVG_MINUTES,
        )),
        cancelled_at: None,
        cancelled_by: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn completed_token(session: &Session, token_number: i32) -> QueueToken {
    let mut token = waiting_token(session, token_number);
    token.status = TokenStatus::Completed;
    token.queue_status = QueueStatus::Completed;
    token
}

/// Seed a session with `count` waiting tokens numbered 1..=count. Returns the
/// tokens in numbering order.
pub async fn seed_queue(h: &Harness, session: &Session, count: i32) -> Vec<QueueToken> {
    h.store.put_session(session.clone()).await;
    let mut tokens = Vec::new();
    for n in 1..=count {
        let token = waiting_token(session, n);
        h.store.put_token(token.clone()).await;
        tokens.push(token);
    }
    tokens
}

/// Token numbers of non-finalized tokens, keyed by appointment id.
pub async fn number_of(h: &Harness, appointment_id: Uuid) -> Option<i32> {
    h.store
        .get_token(appointment_id)
        .await
        .unwrap()
        .and_then(|t| t.token_number)
}
