//! Time effects.
//!
//! The convergence loop never calls `tokio::time` or `SystemTime` directly; it
//! sleeps and reads the clock through this trait so a simulated clock can drive
//! it deterministically.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// Suspend for `duration`. Dropping the future cancels the sleep.
    async fn sleep(&self, duration: Duration);
}

/// Blanket implementation for Arc<T> where T: PhysicalTimeEffects
#[async_trait]
impl<T: PhysicalTimeEffects + ?Sized> PhysicalTimeEffects for std::sync::Arc<T> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}
