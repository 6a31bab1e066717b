//! Running several convergence loops side by side.
//!
//! Each deployer gets its own loop task and its own push channel. Loops share
//! nothing but the shutdown signal and the statuses fanned out to them.
//!
//! Uses `parking_lot::Mutex` for the handle and sender lists; neither lock is
//! held across an `.await`.

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use steward_core::effects::{ControlChannel, PhysicalTimeEffects, StateChangeExecutor};

use crate::convergence::{ClusterStatus, ConvergenceLoop};
use crate::deployer::Deployer;

/// Duplicates control-service pushes to every subscribed loop.
///
/// Each subscriber holds only the latest status. Publishing overwrites it and
/// never waits on a loop that is busy discovering or sleeping.
#[derive(Debug, Default)]
pub struct StatusFanout {
    senders: Mutex<Vec<watch::Sender<Option<ClusterStatus>>>>,
}

impl StatusFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new receiver that sees the latest status published from now on.
    pub fn subscribe(&self) -> watch::Receiver<Option<ClusterStatus>> {
        let (tx, rx) = watch::channel(None);
        self.senders.lock().push(tx);
        rx
    }

    /// Deliver `status` to every live subscriber. Returns how many received it.
    pub fn publish(&self, status: ClusterStatus) -> usize {
        let mut senders = self.senders.lock();
        senders.retain(|sender| sender.send(Some(status.clone())).is_ok());
        senders.len()
    }

    /// Drop every sender, which stops loops waiting on their channels.
    pub fn close(&self) {
        self.senders.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().len()
    }
}

/// Owns the loop tasks and their shared shutdown signal.
#[derive(Debug)]
pub struct ConvergenceRuntime {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    fanout: StatusFanout,
}

impl ConvergenceRuntime {
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            fanout: StatusFanout::new(),
        }
    }

    /// Spawn `convergence_loop`, subscribed to this runtime's pushes.
    pub fn spawn_loop<D, C, X, T>(&self, convergence_loop: ConvergenceLoop<D, C, X, T>)
    where
        D: Deployer + 'static,
        C: ControlChannel + 'static,
        X: StateChangeExecutor<D::Action> + 'static,
        T: PhysicalTimeEffects + 'static,
    {
        let statuses = self.fanout.subscribe();
        let shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(convergence_loop.run(statuses, shutdown));
        self.handles.lock().push(handle);
    }

    /// Push a new configuration and cluster state to every loop.
    pub fn publish(&self, status: ClusterStatus) -> usize {
        self.fanout.publish(status)
    }

    pub fn loop_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Signal every loop to stop and wait for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        debug!(loops = handles.len(), "Waiting for convergence loops");
        for handle in handles {
            let _ = handle.await;
        }
        self.fanout.close();
    }
}

impl Default for ConvergenceRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConvergenceRuntime {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}
