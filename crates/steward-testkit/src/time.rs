//! Simulated clock for driving convergence loops step by step.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

use steward_core::effects::PhysicalTimeEffects;

/// Clock that only moves when a test calls [`advance`](Self::advance).
///
/// Sleepers are counted, so a test can wait until the loop under test is
/// parked before moving time.
#[derive(Debug)]
pub struct SimulatedTimeHandler {
    now: watch::Sender<u64>,
    sleepers: watch::Sender<usize>,
}

impl SimulatedTimeHandler {
    pub fn new(start_time_ms: u64) -> Self {
        let (now, _) = watch::channel(start_time_ms);
        let (sleepers, _) = watch::channel(0);
        Self { now, sleepers }
    }

    /// Create a simulated time handler starting at Unix epoch
    pub fn new_at_epoch() -> Self {
        Self::new(0)
    }

    /// Move time forward, waking every sleeper whose deadline has passed.
    pub fn advance(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.now.send_modify(|now| *now += ms);
    }

    pub fn current_ms(&self) -> u64 {
        *self.now.borrow()
    }

    /// Number of `sleep` calls currently parked.
    pub fn sleepers(&self) -> usize {
        *self.sleepers.borrow()
    }

    /// Wait until exactly `count` sleepers are parked.
    pub async fn wait_for_sleepers(&self, count: usize) {
        let mut rx = self.sleepers.subscribe();
        let _ = rx.wait_for(|parked| *parked == count).await;
    }
}

impl Default for SimulatedTimeHandler {
    fn default() -> Self {
        Self::new_at_epoch()
    }
}

struct SleeperGuard<'a> {
    sleepers: &'a watch::Sender<usize>,
}

impl<'a> SleeperGuard<'a> {
    fn new(sleepers: &'a watch::Sender<usize>) -> Self {
        sleepers.send_modify(|parked| *parked += 1);
        Self { sleepers }
    }
}

impl Drop for SleeperGuard<'_> {
    fn drop(&mut self) {
        self.sleepers.send_modify(|parked| *parked -= 1);
    }
}

#[async_trait]
impl PhysicalTimeEffects for SimulatedTimeHandler {
    fn now_ms(&self) -> u64 {
        self.current_ms()
    }

    async fn sleep(&self, duration: Duration) {
        let deadline = self.current_ms() + duration.as_millis() as u64;
        let mut rx = self.now.subscribe();
        let _guard = SleeperGuard::new(&self.sleepers);
        let _ = rx.wait_for(|now| *now >= deadline).await;
    }
}
