// libs/queue-cell/src/services/controller.rs
//
// Stateful queue operations for a provider's live session: call-next, skip,
// recall, no-show, status updates and pause/resume. Each session is a
// single-writer resource; every mutating path runs under that session's lock
// and commits through the store's version guard before anything is published.
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::QueueError;
use crate::models::{
    projected_slot_time, CallNextOutcome, CancelledBy, EtaEntry, NoShowOutcome, QueueEntry,
    QueueSnapshot, QueueStatus, QueueStatusUpdate, QueueToken, RecallOutcome, Session,
    SessionStatus, SkipOutcome, TokenSlot, TokenStatus, MAX_RECALLS,
};
use crate::services::eta;
use crate::services::locks::SessionLockRegistry;
use crate::services::publisher::{
    patient_topic, session_topic, EventPublisher, NotificationEvent, Notifier,
};
use crate::services::settings::ConsultationSettings;
use crate::store::QueueStore;

pub struct QueueController {
    store: Arc<dyn QueueStore>,
    publisher: Arc<dyn EventPublisher>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<dyn ConsultationSettings>,
    locks: SessionLockRegistry,
    default_minutes: i64,
}

impl QueueController {
    pub fn new(
        store: Arc<dyn QueueStore>,
        publisher: Arc<dyn EventPublisher>,
        notifier: Arc<dyn Notifier>,
        settings: Arc<dyn ConsultationSettings>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            notifier,
            settings,
            locks: SessionLockRegistry::new(config.session_lock_timeout_ms),
            default_minutes: config.default_consultation_minutes,
        }
    }

    // ==========================================================================
    // READ PATHS
    // ==========================================================================

    pub async fn get_queue(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<QueueSnapshot, QueueError> {
        let session = self
            .store
            .find_session(provider_id, date)
            .await?
            .ok_or_else(|| QueueError::NotFound(format!("no session for {}", date)))?;

        let tokens = self.store.find_tokens(session.id).await?;
        let avg = self.avg_minutes(provider_id).await;
        let etas = eta::compute_etas(&session, &tokens, avg, Utc::now());

        let queue = tokens
            .into_iter()
            .map(|appointment| {
                let eta = etas
                    .iter()
                    .find(|e| e.appointment_id == appointment.id)
                    .cloned();
                QueueEntry { appointment, eta }
            })
            .collect();

        let current_token = session.current_token;
        Ok(QueueSnapshot {
            session,
            queue,
            current_token,
        })
    }

    pub async fn get_eta(
        &self,
        provider_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<EtaEntry, QueueError> {
        let token = self.load_token(appointment_id).await?;
        let session = self.load_owned_session(token.session_id, provider_id).await?;
        let tokens = self.store.find_tokens(session.id).await?;
        let avg = self.avg_minutes(provider_id).await;

        eta::compute_eta_for(&session, &tokens, appointment_id, avg, Utc::now()).ok_or_else(|| {
            QueueError::InvalidState(format!("appointment {} has no token number", appointment_id))
        })
    }

    // ==========================================================================
    // CALL-NEXT
    // ==========================================================================

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn call_next(
        &self,
        provider_id: Uuid,
        session_id: Uuid,
        appointment_id: Option<Uuid>,
    ) -> Result<CallNextOutcome, QueueError> {
        let _guard = self.locks.acquire(session_id).await?;
        let now = Utc::now();

        let mut session = self.load_owned_session(session_id, provider_id).await?;
        if session.status.is_terminal() {
            return Err(QueueError::InvalidState(format!(
                "session is {}",
                session.status
            )));
        }

        let mut tokens = self.store.find_tokens(session_id).await?;

        let selected = match appointment_id {
            Some(id) => {
                let token = tokens
                    .iter()
                    .find(|t| t.id == id)
                    .ok_or_else(|| QueueError::NotFound(format!("appointment {}", id)))?;
                if !token.status.is_callable() || token.queue_status != QueueStatus::Waiting {
                    return Err(QueueError::InvalidState(format!(
                        "appointment {} is not callable ({}, queue {:?})",
                        id, token.status, token.queue_status
                    )));
                }
                token.clone()
            }
            None => tokens
                .iter()
                .filter(|t| t.status.is_callable() && t.queue_status == QueueStatus::Waiting)
                .filter(|t| matches!(t.token_number, Some(n) if n > session.current_token))
                .min_by_key(|t| t.token_number)
                .cloned()
                .ok_or(QueueError::NoEligibleToken { session_id })?,
        };

        let token_number = selected
            .token_number
            .ok_or_else(|| QueueError::InvalidState("token has no number".to_string()))?;

        let mut called = selected;
        called.status = TokenStatus::Called;
        called.updated_at = now;

        session.current_token = token_number;
        if session.status == SessionStatus::Scheduled {
            session.status = SessionStatus::Live;
            session.started_at = Some(now);
        }
        session.updated_at = now;

        // The session row carries the version guard; it commits first so a
        // lost race leaves the token untouched.
        session = self.store.save_session(&session).await?;
        self.store.save_token(&called).await?;

        if let Some(slot) = tokens.iter_mut().find(|t| t.id == called.id) {
            *slot = called.clone();
        }

        info!(
            "Called token {} (appointment {}) in session {}",
            token_number, called.id, session_id
        );

        let etas = self.publish_queue_state(&session, &tokens, now).await;

        self.send_notification(
            called.patient_id,
            NotificationEvent::Called,
            json!({ "appointment_id": called.id, "token_number": token_number }),
        )
        .await;

        // Pre-alert whoever is next in line after the called token.
        if let Some(next) = tokens
            .iter()
            .filter(|t| t.id != called.id)
            .filter(|t| t.status.is_callable() && t.queue_status == QueueStatus::Waiting)
            .filter(|t| matches!(t.token_number, Some(n) if n > token_number))
            .min_by_key(|t| t.token_number)
        {
            self.send_notification(
                next.patient_id,
                NotificationEvent::PreAlert,
                json!({ "appointment_id": next.id, "token_number": next.token_number }),
            )
            .await;
        }

        Ok(CallNextOutcome {
            session,
            appointment: called,
            etas,
        })
    }

    // ==========================================================================
    // SKIP
    // ==========================================================================

    /// Move one patient to the back of the remaining queue. Finalized tokens
    /// anchor their numbers; everyone behind the skipped patient compacts
    /// downward around those anchors.
    #[instrument(skip(self), fields(appointment_id = %appointment_id))]
    pub async fn skip(
        &self,
        provider_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<SkipOutcome, QueueError> {
        let probe = self.load_token(appointment_id).await?;
        let _guard = self.locks.acquire(probe.session_id).await?;
        let now = Utc::now();

        let session = self.load_owned_session(probe.session_id, provider_id).await?;
        let tokens = self.store.find_tokens(session.id).await?;
        let token = tokens
            .iter()
            .find(|t| t.id == appointment_id)
            .cloned()
            .ok_or_else(|| QueueError::NotFound(format!("appointment {}", appointment_id)))?;

        if matches!(token.status, TokenStatus::Cancelled | TokenStatus::NoShow)
            || matches!(token.queue_status, QueueStatus::Cancelled | QueueStatus::NoShow)
        {
            return Err(QueueError::InvalidState(
                "cannot skip a cancelled or no-show token".to_string(),
            ));
        }
        if token.is_fixed() {
            return Err(QueueError::InvalidState(
                "cannot skip a finalized token".to_string(),
            ));
        }
        let orig = token.token_number.ok_or_else(|| {
            QueueError::InvalidState(format!("appointment {} has no token number", appointment_id))
        })?;

        // Single pass: fixed anchors vs movable tokens.
        let mut fixed: BTreeSet<i32> = BTreeSet::new();
        let mut max_token = orig;
        for t in &tokens {
            match TokenSlot::classify(t.clone()) {
                Some(TokenSlot::Fixed(n)) => {
                    fixed.insert(n);
                    max_token = max_token.max(n);
                }
                Some(TokenSlot::Movable(m)) => {
                    if let Some(n) = m.token_number {
                        max_token = max_token.max(n);
                    }
                }
                None => {}
            }
        }

        // Target: highest slot, walked down past fixed anchors, never below
        // the original position.
        let mut target = max_token;
        while target > orig && fixed.contains(&target) {
            target -= 1;
        }

        // Retry-safe: an already-skipped token sitting at its target is done.
        if token.queue_status == QueueStatus::Skipped && orig == target {
            return Ok(SkipOutcome {
                old_token_number: orig,
                new_token_number: orig,
                patients_shifted: 0,
            });
        }

        let avg = self.avg_minutes(provider_id).await;
        let mut movers: Vec<QueueToken> = tokens
            .iter()
            .filter(|t| t.id != appointment_id && !t.is_fixed())
            .filter(|t| matches!(t.token_number, Some(n) if n > orig))
            .cloned()
            .collect();
        movers.sort_by_key(|t| t.token_number);

        let mut claimed: BTreeSet<i32> = BTreeSet::new();
        let mut patients_shifted: i64 = 0;
        let mut changed: Vec<QueueToken> = Vec::new();

        for mut mover in movers {
            let n = mover.token_number.unwrap_or(orig);
            let mut candidate = n - 1;
            while candidate > orig && (fixed.contains(&candidate) || claimed.contains(&candidate)) {
                candidate -= 1;
            }
            if candidate < orig || fixed.contains(&candidate) || claimed.contains(&candidate) {
                // Nowhere lower to go; the slot stays occupied.
                claimed.insert(n);
                continue;
            }

            mover.token_number = Some(candidate);
            mover.time = Some(projected_slot_time(
                session.session_start_time,
                candidate,
                avg,
            ));
            mover.updated_at = now;
            claimed.insert(candidate);
            patients_shifted += 1;
            changed.push(mover);
        }

        let mut skipped = token.clone();
        skipped.token_number = Some(target);
        skipped.queue_status = QueueStatus::Skipped;
        if skipped.status.is_active() {
            // No longer being actively served.
            skipped.status = TokenStatus::Scheduled;
        }
        skipped.time = Some(projected_slot_time(session.session_start_time, target, avg));
        skipped.updated_at = now;
        changed.push(skipped.clone());

        // Hard invariant: reject before any write if the reshuffle would
        // produce duplicate numbers among non-fixed tokens.
        let post_state = Self::apply_changes(&tokens, &changed);
        Self::check_token_numbers(&post_state)?;

        self.store.save_tokens(&changed).await?;

        info!(
            "Skipped appointment {}: token {} -> {} ({} shifted)",
            appointment_id, orig, target, patients_shifted
        );

        let etas = self.publish_queue_state(&session, &post_state, now).await;
        let skipped_eta = etas
            .iter()
            .find(|e| e.appointment_id == appointment_id)
            .cloned()
            .or_else(|| {
                eta::compute_eta_for(&session, &post_state, appointment_id, avg, now)
            });

        self.send_notification(
            skipped.patient_id,
            NotificationEvent::Skipped,
            json!({
                "appointment_id": appointment_id,
                "token_number": target,
                "eta": skipped_eta,
            }),
        )
        .await;

        Ok(SkipOutcome {
            old_token_number: orig,
            new_token_number: target,
            patients_shifted,
        })
    }

    // ==========================================================================
    // RECALL
    // ==========================================================================

    pub async fn recall(
        &self,
        provider_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<RecallOutcome, QueueError> {
        let probe = self.load_token(appointment_id).await?;
        let _guard = self.locks.acquire(probe.session_id).await?;
        let now = Utc::now();

        let session = self.load_owned_session(probe.session_id, provider_id).await?;
        let mut token = self.load_token(appointment_id).await?;

        let recallable = matches!(token.queue_status, QueueStatus::Skipped | QueueStatus::NoShow)
            || token.status.is_active();
        if !recallable {
            return Err(QueueError::InvalidState(format!(
                "appointment {} is not recallable ({}, queue {:?})",
                appointment_id, token.status, token.queue_status
            )));
        }
        if !token.can_recall() {
            return Err(QueueError::RecallLimitExceeded {
                appointment_id,
                recall_count: token.recall_count,
            });
        }

        token.recall_count += 1;
        token.status = TokenStatus::Waiting;
        token.queue_status = QueueStatus::Waiting;
        // A recalled no-show re-enters the queue; it is no longer cancelled.
        token.cancelled_at = None;
        token.cancelled_by = None;
        token.updated_at = now;

        self.store.save_token(&token).await?;

        info!(
            "Recalled appointment {} (recall {}/{})",
            appointment_id, token.recall_count, MAX_RECALLS
        );

        let tokens = self.store.find_tokens(session.id).await?;
        self.publish_queue_state(&session, &tokens, now).await;

        self.send_notification(
            token.patient_id,
            NotificationEvent::Recalled,
            json!({
                "appointment_id": appointment_id,
                "token_number": token.token_number,
                "recall_count": token.recall_count,
            }),
        )
        .await;

        let recall_count = token.recall_count;
        Ok(RecallOutcome {
            appointment: token,
            recall_count,
            can_recall_again: recall_count < MAX_RECALLS,
        })
    }

    // ==========================================================================
    // NO-SHOW
    // ==========================================================================

    pub async fn mark_no_show(
        &self,
        provider_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<NoShowOutcome, QueueError> {
        let probe = self.load_token(appointment_id).await?;
        let _guard = self.locks.acquire(probe.session_id).await?;
        let now = Utc::now();

        let mut session = self.load_owned_session(probe.session_id, provider_id).await?;
        let mut token = self.load_token(appointment_id).await?;

        let tokens = self.apply_no_show(&mut session, &mut token, now).await?;
        self.publish_queue_state(&session, &tokens, now).await;

        self.send_notification(
            token.patient_id,
            NotificationEvent::Cancelled,
            json!({
                "appointment_id": appointment_id,
                "reason": "no_show",
                "can_reschedule": true,
            }),
        )
        .await;

        Ok(NoShowOutcome {
            appointment: token,
            can_reschedule: true,
        })
    }

    // ==========================================================================
    // GENERIC STATUS UPDATE & COMPLETION
    // ==========================================================================

    pub async fn update_queue_status(
        &self,
        provider_id: Uuid,
        appointment_id: Uuid,
        status: QueueStatusUpdate,
    ) -> Result<QueueToken, QueueError> {
        let probe = self.load_token(appointment_id).await?;
        let _guard = self.locks.acquire(probe.session_id).await?;
        let now = Utc::now();

        let mut session = self.load_owned_session(probe.session_id, provider_id).await?;
        let mut token = self.load_token(appointment_id).await?;

        if token.status.is_fixed() {
            return Err(QueueError::InvalidState(format!(
                "appointment {} is already {}",
                appointment_id, token.status
            )));
        }

        let tokens = match status {
            QueueStatusUpdate::Waiting => {
                token.status = TokenStatus::Waiting;
                token.queue_status = QueueStatus::Waiting;
                token.updated_at = now;
                self.store.save_token(&token).await?;
                self.store.find_tokens(session.id).await?
            }
            QueueStatusUpdate::InConsultation => {
                token.status = TokenStatus::InConsultation;
                token.updated_at = now;
                self.store.save_token(&token).await?;
                self.store.find_tokens(session.id).await?
            }
            QueueStatusUpdate::NoShow => {
                self.apply_no_show(&mut session, &mut token, now).await?
            }
            QueueStatusUpdate::Completed => {
                token.status = TokenStatus::Completed;
                token.queue_status = QueueStatus::Completed;
                token.updated_at = now;
                self.store.save_token(&token).await?;

                // Downstream consultation record; consumed outside the
                // scheduler.
                if let Err(e) = self
                    .publisher
                    .publish(
                        "consultation.completed",
                        json!({
                            "appointment_id": token.id,
                            "patient_id": token.patient_id,
                            "provider_id": session.provider_id,
                            "session_id": session.id,
                            "completed_at": now,
                        }),
                    )
                    .await
                {
                    warn!("Failed to publish consultation completion: {}", e);
                }

                let tokens = self.store.find_tokens(session.id).await?;
                self.finalize_session_progress(&mut session, &tokens, &token, now)
                    .await?;
                tokens
            }
        };

        if matches!(
            status,
            QueueStatusUpdate::Completed | QueueStatusUpdate::NoShow
        ) && session.status == SessionStatus::Completed
        {
            self.locks.evict(session.id).await;
        }

        self.publish_queue_state(&session, &tokens, now).await;

        if status == QueueStatusUpdate::Completed {
            self.send_notification(
                token.patient_id,
                NotificationEvent::Completed,
                json!({ "appointment_id": token.id }),
            )
            .await;
        }

        Ok(token)
    }

    // ==========================================================================
    // PAUSE / RESUME
    // ==========================================================================

    pub async fn pause(&self, provider_id: Uuid, session_id: Uuid) -> Result<Session, QueueError> {
        let _guard = self.locks.acquire(session_id).await?;
        let now = Utc::now();

        let mut session = self.load_owned_session(session_id, provider_id).await?;
        if session.status != SessionStatus::Live {
            return Err(QueueError::InvalidState(format!(
                "cannot pause a {} session",
                session.status
            )));
        }

        session.status = SessionStatus::Paused;
        session.paused_at = Some(now);
        session.updated_at = now;
        let session = self.store.save_session(&session).await?;

        info!("Paused session {}", session_id);

        let tokens = self.store.find_tokens(session_id).await?;
        self.publish_queue_state(&session, &tokens, now).await;

        Ok(session)
    }

    pub async fn resume(&self, provider_id: Uuid, session_id: Uuid) -> Result<Session, QueueError> {
        let _guard = self.locks.acquire(session_id).await?;
        let now = Utc::now();

        let mut session = self.load_owned_session(session_id, provider_id).await?;
        if session.status != SessionStatus::Paused {
            return Err(QueueError::InvalidState(format!(
                "cannot resume a {} session",
                session.status
            )));
        }

        let paused_at = session.paused_at.ok_or_else(|| {
            QueueError::Consistency(format!("paused session {} has no paused_at", session_id))
        })?;
        let duration_minutes = (now - paused_at).num_minutes().max(0);

        session.pause_history.push(crate::models::PauseInterval {
            paused_at,
            resumed_at: now,
            duration_minutes,
        });
        session.paused_at = None;
        session.status = SessionStatus::Live;
        session.updated_at = now;
        let session = self.store.save_session(&session).await?;

        info!(
            "Resumed session {} after {} minutes",
            session_id, duration_minutes
        );

        let tokens = self.store.find_tokens(session_id).await?;
        self.publish_queue_state(&session, &tokens, now).await;

        Ok(session)
    }

    // ==========================================================================
    // PRIVATE HELPERS
    // ==========================================================================

    async fn load_owned_session(
        &self,
        session_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Session, QueueError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(format!("session {}", session_id)))?;

        if session.provider_id != provider_id {
            return Err(QueueError::Unauthorized(format!(
                "session {} does not belong to provider {}",
                session_id, provider_id
            )));
        }
        Ok(session)
    }

    async fn load_token(&self, appointment_id: Uuid) -> Result<QueueToken, QueueError> {
        self.store
            .get_token(appointment_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(format!("appointment {}", appointment_id)))
    }

    async fn avg_minutes(&self, provider_id: Uuid) -> i64 {
        self.settings
            .average_consultation_minutes(provider_id)
            .await
            .unwrap_or(self.default_minutes)
    }

    /// Token mutations for a no-show plus the session bookkeeping that
    /// follows. Shared by `mark_no_show` and the generic status update.
    async fn apply_no_show(
        &self,
        session: &mut Session,
        token: &mut QueueToken,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueToken>, QueueError> {
        if token.status.is_fixed() {
            return Err(QueueError::InvalidState(format!(
                "appointment {} is already {}",
                token.id, token.status
            )));
        }

        token.status = TokenStatus::Cancelled;
        token.queue_status = QueueStatus::NoShow;
        token.cancelled_at = Some(now);
        token.cancelled_by = Some(CancelledBy::Doctor);
        token.updated_at = now;
        self.store.save_token(token).await?;

        let tokens = self.store.find_tokens(session.id).await?;
        let active_booked = tokens.iter().filter(|t| !t.is_fixed()).count() as i32;

        session.current_token = (active_booked - 1).max(0);
        if active_booked == 0 && session.status.can_transition_to(&SessionStatus::Completed) {
            session.status = SessionStatus::Completed;
            session.ended_at = Some(now);
        }
        session.updated_at = now;
        *session = self.store.save_session(session).await?;

        if session.status == SessionStatus::Completed {
            info!("Session {} completed: no active tokens remain", session.id);
            self.locks.evict(session.id).await;
        }

        Ok(tokens)
    }

    /// After a completion: advance current_token past the finished slot and
    /// close the session once nothing pending remains.
    async fn finalize_session_progress(
        &self,
        session: &mut Session,
        tokens: &[QueueToken],
        finished: &QueueToken,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        if let Some(n) = finished.token_number {
            if session.current_token < n {
                session.current_token = n;
            }
        }

        let pending = tokens.iter().filter(|t| !t.is_fixed()).count();
        if pending == 0 && session.status.can_transition_to(&SessionStatus::Completed) {
            session.status = SessionStatus::Completed;
            session.ended_at = Some(now);
            info!("Session {} completed: last token finished", session.id);
        }
        session.updated_at = now;
        *session = self.store.save_session(session).await?;
        Ok(())
    }

    /// Recompute ETAs over post-mutation state and fan them out. Publish
    /// failures are logged and never fail the operation.
    async fn publish_queue_state(
        &self,
        session: &Session,
        tokens: &[QueueToken],
        now: DateTime<Utc>,
    ) -> Vec<EtaEntry> {
        let avg = self.avg_minutes(session.provider_id).await;
        let etas = eta::compute_etas(session, tokens, avg, now);

        let payload = json!({
            "session_id": session.id,
            "status": session.status,
            "current_token": session.current_token,
            "etas": etas,
        });
        if let Err(e) = self
            .publisher
            .publish(&session_topic(session.id), payload)
            .await
        {
            warn!("Failed to publish queue update for {}: {}", session.id, e);
        }

        for entry in &etas {
            if let Err(e) = self
                .publisher
                .publish(&patient_topic(entry.patient_id), json!(entry))
                .await
            {
                warn!(
                    "Failed to publish ETA for patient {}: {}",
                    entry.patient_id, e
                );
            }
        }

        etas
    }

    async fn send_notification(
        &self,
        user_id: Uuid,
        event: NotificationEvent,
        payload: serde_json::Value,
    ) {
        if let Err(e) = self.notifier.notify(user_id, event, payload).await {
            warn!("Notification {} to {} failed: {}", event, user_id, e);
        }
    }

    fn apply_changes(tokens: &[QueueToken], changed: &[QueueToken]) -> Vec<QueueToken> {
        tokens
            .iter()
            .map(|t| {
                changed
                    .iter()
                    .find(|c| c.id == t.id)
                    .cloned()
                    .unwrap_or_else(|| t.clone())
            })
            .collect()
    }

    /// Uniqueness invariant: no two non-fixed tokens share a number, and no
    /// non-fixed token sits on a fixed anchor.
    fn check_token_numbers(tokens: &[QueueToken]) -> Result<(), QueueError> {
        let fixed: BTreeSet<i32> = tokens
            .iter()
            .filter(|t| t.is_fixed())
            .filter_map(|t| t.token_number)
            .collect();

        let mut seen: BTreeSet<i32> = BTreeSet::new();
        for token in tokens.iter().filter(|t| !t.is_fixed()) {
            if let Some(n) = token.token_number {
                if fixed.contains(&n) {
                    return Err(QueueError::Consistency(format!(
                        "token number {} collides with a finalized slot",
                        n
                    )));
                }
                if !seen.insert(n) {
                    return Err(QueueError::Consistency(format!(
                        "duplicate token number {} among active tokens",
                        n
                    )));
                }
            }
        }
        Ok(())
    }
}
