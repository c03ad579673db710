use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Read-only provider configuration consumed by the scheduler. `None` means
/// the provider has no configured average and the caller falls back to the
/// application default.
#[async_trait]
pub trait ConsultationSettings: Send + Sync {
    async fn average_consultation_minutes(&self, provider_id: Uuid) -> Option<i64>;
}

/// In-process settings map. Production wiring can load per-provider averages
/// from the doctor profile table into this at startup.
#[derive(Default)]
pub struct StaticConsultationSettings {
    overrides: RwLock<HashMap<Uuid, i64>>,
}

impl StaticConsultationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, provider_id: Uuid, minutes: i64) {
        self.overrides.write().await.insert(provider_id, minutes);
    }
}

#[async_trait]
impl ConsultationSettings for StaticConsultationSettings {
    async fn average_consultation_minutes(&self, provider_id: Uuid) -> Option<i64> {
        self.overrides.read().await.get(&provider_id).copied()
    }
}
