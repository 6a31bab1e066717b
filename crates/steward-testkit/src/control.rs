//! Control channel that records what it was sent.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

use steward_core::effects::ControlChannel;
use steward_core::{ClusterStateChange, Result, StewardError};

#[derive(Debug)]
pub struct RecordingControlChannel {
    sent: Mutex<Vec<Vec<ClusterStateChange>>>,
    attempts: watch::Sender<usize>,
    failing: AtomicBool,
}

impl RecordingControlChannel {
    pub fn new() -> Self {
        let (attempts, _) = watch::channel(0);
        Self {
            sent: Mutex::new(Vec::new()),
            attempts,
            failing: AtomicBool::new(false),
        }
    }

    /// Make subsequent sends fail (and not be recorded) until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every successful send, oldest first.
    pub fn sent(&self) -> Vec<Vec<ClusterStateChange>> {
        self.sent.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Sends attempted, failed ones included.
    pub fn attempt_count(&self) -> usize {
        *self.attempts.borrow()
    }

    pub async fn wait_for_attempts(&self, count: usize) {
        let mut rx = self.attempts.subscribe();
        let _ = rx.wait_for(|attempts| *attempts >= count).await;
    }
}

impl Default for RecordingControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlChannel for RecordingControlChannel {
    async fn send_state_changes(&self, changes: Vec<ClusterStateChange>) -> Result<()> {
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(StewardError::control("control service unreachable"))
        } else {
            self.sent.lock().push(changes);
            Ok(())
        };
        self.attempts.send_modify(|attempts| *attempts += 1);
        result
    }
}
