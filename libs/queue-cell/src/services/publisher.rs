use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::QueueError;

pub type TopicSender = broadcast::Sender<String>;
pub type TopicReceiver = broadcast::Receiver<String>;

pub fn session_topic(session_id: Uuid) -> String {
    format!("queue.{}", session_id)
}

pub fn patient_topic(patient_id: Uuid) -> String {
    format!("patient.{}", patient_id)
}

/// Fire-and-forget fan-out of queue/ETA updates. The controller never treats
/// a publish failure as an operation failure.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), QueueError>;
}

/// Best-effort per-patient notification (called/skipped/recalled/cancelled).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user_id: Uuid,
        event: NotificationEvent,
        payload: Value,
    ) -> Result<(), QueueError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    Called,
    PreAlert,
    Skipped,
    Recalled,
    Cancelled,
    Completed,
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationEvent::Called => write!(f, "called"),
            NotificationEvent::PreAlert => write!(f, "pre_alert"),
            NotificationEvent::Skipped => write!(f, "skipped"),
            NotificationEvent::Recalled => write!(f, "recalled"),
            NotificationEvent::Cancelled => write!(f, "cancelled"),
            NotificationEvent::Completed => write!(f, "completed"),
        }
    }
}

/// Broadcast-channel fan-out: one channel per topic plus a global channel
/// for monitoring. WebSocket/SSE transports subscribe to these; delivery and
/// retry are their problem, not the scheduler's.
pub struct BroadcastPublisher {
    channels: Arc<RwLock<HashMap<String, TopicSender>>>,
    global: TopicSender,
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        let (global, _) = broadcast::channel(1000);
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            global,
        }
    }

    pub async fn subscribe(&self, topic: &str) -> TopicReceiver {
        let mut channels = self.channels.write().await;
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(100).0)
            .subscribe()
    }

    pub fn subscribe_global(&self) -> TopicReceiver {
        self.global.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for BroadcastPublisher {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            global: self.global.clone(),
        }
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), QueueError> {
        let envelope = serde_json::json!({
            "topic": topic,
            "timestamp": Utc::now().to_rfc3339(),
            "data": payload,
        })
        .to_string();

        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(topic) {
                if let Err(e) = sender.send(envelope.clone()) {
                    // No live subscribers; not an error for a live feed.
                    debug!("No receivers on topic {}: {}", topic, e);
                }
            }
        }

        if let Err(e) = self.global.send(envelope) {
            debug!("No receivers on global channel: {}", e);
        }

        Ok(())
    }
}

/// Notifier that records the notification in the log stream only. The real
/// push/email dispatcher is a downstream consumer of the published events.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(
        &self,
        user_id: Uuid,
        event: NotificationEvent,
        payload: Value,
    ) -> Result<(), QueueError> {
        info!("Notify user {} of {}: {}", user_id, event, payload);
        Ok(())
    }
}

/// Logs and swallows both sides; handy default when no transport is wired.
pub struct NullPublisher;

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn publish(&self, topic: &str, _payload: Value) -> Result<(), QueueError> {
        warn!("Publish to {} dropped: no transport configured", topic);
        Ok(())
    }
}
