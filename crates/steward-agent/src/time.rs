//! Production time handler backed by tokio and the system clock.

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use steward_core::effects::PhysicalTimeEffects;

/// Wall-clock time handler used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeHandler;

impl RealTimeHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhysicalTimeEffects for RealTimeHandler {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
