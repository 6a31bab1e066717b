//! Convergence loop driver
//!
//! Drives one [`Deployer`] through repeated discover → share → calculate →
//! apply cycles. Collaborators are passed in explicitly: the control channel,
//! the executor for calculated changes, the clock and the registry handle.
//!
//! Configuration and cluster state arrive as [`ClusterStatus`] pushes on a
//! watch channel holding only the latest push. The loop does nothing until
//! the first push, and every cycle starts from the most recent one.
//!
//! Timing after each cycle:
//! - `NoOp`: sleep `poll_interval`. A push wakes the loop early only if
//!   recalculating against it with the last local state yields real work.
//! - change succeeded: sleep `unconverged_delay`, reset the failure backoff
//! - change failed: sleep the failure backoff, then double it up to the cap
//! - discovery failed: sleep `poll_interval`; only shutdown wakes it

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use steward_core::effects::{ControlChannel, PhysicalTimeEffects, Registry, StateChangeExecutor};
use steward_core::{run_state_change, ClusterStateChange, Deployment, DeploymentState, StateChange};

use crate::deployer::Deployer;
use crate::local_state::LocalState;

/// One push from the control service: desired configuration plus observed
/// cluster state. Both are read-only for the cycle that consumes them.
#[derive(Debug, Clone, Default)]
pub struct ClusterStatus {
    pub configuration: Arc<Deployment>,
    pub state: Arc<DeploymentState>,
}

impl ClusterStatus {
    pub fn new(configuration: Deployment, state: DeploymentState) -> Self {
        Self {
            configuration: Arc::new(configuration),
            state: Arc::new(state),
        }
    }
}

/// Delays used between cycles that did some work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Delay before rediscovery after a change succeeded
    pub unconverged_delay: Duration,
    /// First delay after a change failed
    pub failure_backoff: Duration,
    /// Cap for the doubling failure delay
    pub max_failure_backoff: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            unconverged_delay: Duration::from_millis(100),
            failure_backoff: Duration::from_secs(1),
            max_failure_backoff: Duration::from_secs(60),
        }
    }
}

impl LoopTiming {
    /// Short delays for tests.
    pub fn for_testing() -> Self {
        Self {
            unconverged_delay: Duration::from_millis(10),
            failure_backoff: Duration::from_millis(50),
            max_failure_backoff: Duration::from_millis(400),
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_failure_backoff)
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Waiting for the first push
    Idle,
    /// `discover_state` in flight
    Discovering,
    /// Executing a calculated change
    Converging,
    /// Between cycles
    Sleeping,
    /// Exited
    Stopped,
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Continue,
    Stop,
}

/// The loop driver for one agent.
pub struct ConvergenceLoop<D, C, X, T>
where
    D: Deployer,
{
    deployer: D,
    control: C,
    executor: X,
    time: T,
    registry: Arc<dyn Registry>,
    timing: LoopTiming,
    phase_tx: watch::Sender<LoopPhase>,
}

impl<D, C, X, T> ConvergenceLoop<D, C, X, T>
where
    D: Deployer,
    C: ControlChannel,
    X: StateChangeExecutor<D::Action>,
    T: PhysicalTimeEffects,
{
    pub fn new(deployer: D, control: C, executor: X, time: T, registry: Arc<dyn Registry>) -> Self {
        let (phase_tx, _) = watch::channel(LoopPhase::Idle);
        Self {
            deployer,
            control,
            executor,
            time,
            registry,
            timing: LoopTiming::default(),
            phase_tx,
        }
    }

    pub fn with_timing(mut self, timing: LoopTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Observe phase transitions.
    pub fn phases(&self) -> watch::Receiver<LoopPhase> {
        self.phase_tx.subscribe()
    }

    fn set_phase(&self, phase: LoopPhase) {
        self.phase_tx.send_replace(phase);
    }

    /// Run until `shutdown` becomes true or the push channel closes.
    pub async fn run(
        self,
        mut statuses: watch::Receiver<Option<ClusterStatus>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let node_uuid = self.deployer.node_uuid();
        let hostname = self.deployer.hostname().to_string();
        info!(%node_uuid, %hostname, "Convergence loop starting");

        let mut status = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => None,
            pushed = first_status(&mut statuses) => pushed,
        };

        let mut last_sent: Option<Vec<ClusterStateChange>> = None;
        let mut backoff = self.timing.failure_backoff;
        let mut iteration: u64 = 0;

        while let Some(current) = status.as_mut() {
            let latest = statuses.borrow_and_update().clone();
            if let Some(next) = latest {
                *current = next;
            }
            iteration += 1;

            self.set_phase(LoopPhase::Discovering);
            let seed = current.state.node_or_empty(node_uuid, &hostname);
            let discovered = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                result = self.deployer.discover_state(&seed) => result,
            };

            let local_state = match discovered {
                Ok(local_state) => local_state,
                Err(e) => {
                    warn!(%node_uuid, iteration, error = %e, "Discovery failed");
                    self.set_phase(LoopPhase::Sleeping);
                    if self.sleep(self.deployer.poll_interval(), &mut shutdown).await == Wake::Stop {
                        break;
                    }
                    continue;
                }
            };

            let shared = local_state.shared_state_changes();
            if last_sent.as_ref() != Some(&shared) {
                match self.control.send_state_changes(shared.clone()).await {
                    Ok(()) => last_sent = Some(shared.clone()),
                    Err(e) => warn!(%node_uuid, iteration, error = %e, "Failed to share local state"),
                }
            }

            let change = self.calculate(current, &shared, &local_state);
            debug!(%node_uuid, iteration, noop = change.is_noop(), "Calculated changes");

            let wake = if change.is_noop() {
                self.set_phase(LoopPhase::Sleeping);
                self.sleep_until_work(current, &local_state, &shared, &mut statuses, &mut shutdown)
                    .await
            } else {
                self.set_phase(LoopPhase::Converging);
                let delay = match run_state_change(&change, &self.executor).await {
                    Ok(()) => {
                        backoff = self.timing.failure_backoff;
                        self.timing.unconverged_delay
                    }
                    Err(e) => {
                        warn!(%node_uuid, iteration, error = %e, ?backoff, "Applying changes failed");
                        let delay = backoff;
                        backoff = self.timing.next_backoff(backoff);
                        delay
                    }
                };
                self.set_phase(LoopPhase::Sleeping);
                self.sleep(delay, &mut shutdown).await
            };

            if wake == Wake::Stop {
                break;
            }
        }

        self.set_phase(LoopPhase::Stopped);
        info!(%node_uuid, iterations = iteration, "Convergence loop stopped");
    }

    fn calculate(
        &self,
        status: &ClusterStatus,
        shared: &[ClusterStateChange],
        local_state: &D::LocalState,
    ) -> StateChange<D::Action> {
        let cluster_state = status.state.apply_changes(shared);
        self.deployer.calculate_changes(
            &status.configuration,
            &cluster_state,
            self.registry.as_ref(),
            local_state,
        )
    }

    async fn sleep(&self, duration: Duration, shutdown: &mut watch::Receiver<bool>) -> Wake {
        tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => Wake::Stop,
            _ = self.time.sleep(duration) => Wake::Continue,
        }
    }

    /// Sleep for `poll_interval`, recalculating on every push. Returns early
    /// only when a push produces something to do.
    async fn sleep_until_work(
        &self,
        status: &mut ClusterStatus,
        local_state: &D::LocalState,
        shared: &[ClusterStateChange],
        statuses: &mut watch::Receiver<Option<ClusterStatus>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Wake {
        let mut sleep = self.time.sleep(self.deployer.poll_interval());
        loop {
            let changed = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => return Wake::Stop,
                _ = &mut sleep => return Wake::Continue,
                changed = statuses.changed() => changed,
            };
            if changed.is_err() {
                return Wake::Stop;
            }
            let pushed = statuses.borrow_and_update().clone();
            let Some(next) = pushed else {
                continue;
            };
            *status = next;
            if !self.calculate(status, shared, local_state).is_noop() {
                debug!(node_uuid = %self.deployer.node_uuid(), "Push produced work, waking");
                return Wake::Continue;
            }
        }
    }
}

/// The first pushed status, or `None` if the sender goes away first.
async fn first_status(
    statuses: &mut watch::Receiver<Option<ClusterStatus>>,
) -> Option<ClusterStatus> {
    let pushed = statuses.wait_for(Option::is_some).await.ok()?;
    pushed.clone()
}

/// Resolves once shutdown is requested. A dropped sender never resolves.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
