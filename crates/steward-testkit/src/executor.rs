//! Executor that records actions instead of performing them.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use tokio::sync::watch;

use steward_core::effects::StateChangeExecutor;
use steward_core::{Result, StewardError};

#[derive(Debug)]
pub struct RecordingExecutor<A> {
    executed: Mutex<Vec<A>>,
    count: watch::Sender<usize>,
    fail_with: Mutex<Option<String>>,
}

impl<A: Clone> RecordingExecutor<A> {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            executed: Mutex::new(Vec::new()),
            count,
            fail_with: Mutex::new(None),
        }
    }

    /// Fail every action with `message` until cleared with `None`.
    pub fn set_failure(&self, message: Option<&str>) {
        *self.fail_with.lock() = message.map(str::to_string);
    }

    /// Every action seen, failed ones included.
    pub fn executed(&self) -> Vec<A> {
        self.executed.lock().clone()
    }

    pub fn execution_count(&self) -> usize {
        *self.count.borrow()
    }

    pub async fn wait_for_executions(&self, count: usize) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|seen| *seen >= count).await;
    }
}

impl<A: Clone> Default for RecordingExecutor<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A> StateChangeExecutor<A> for RecordingExecutor<A>
where
    A: Clone + fmt::Debug + Send + Sync,
{
    async fn execute(&self, action: &A) -> Result<()> {
        self.executed.lock().push(action.clone());
        let failure = self.fail_with.lock().clone();
        self.count.send_modify(|seen| *seen += 1);
        match failure {
            Some(message) => Err(StewardError::execution(format!("{action:?}: {message}"))),
            None => Ok(()),
        }
    }
}
