//! Deployer whose discovery results and calculations are scripted by a test.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

use steward_agent::{Deployer, NodeLocalState};
use steward_core::effects::Registry;
use steward_core::{Deployment, DeploymentState, NodeId, NodeState, Result, StateChange, StewardError};

type CalculatePolicy =
    dyn Fn(&Deployment, &DeploymentState, &NodeLocalState) -> StateChange<String> + Send + Sync;

/// A [`Deployer`] with scripted discovery and a pluggable calculation.
///
/// Discovery pops the next scripted result, falling back to the steady state
/// once the script runs out. Calculation is `NoOp` unless a policy is set.
pub struct ScriptedDeployer {
    node_uuid: NodeId,
    hostname: String,
    poll_interval: Duration,
    script: Mutex<VecDeque<Result<NodeState>>>,
    steady_state: Mutex<NodeState>,
    seeds: Mutex<Vec<NodeState>>,
    discoveries: watch::Sender<usize>,
    calculations: watch::Sender<usize>,
    blocked: watch::Sender<bool>,
    policy: Box<CalculatePolicy>,
}

impl ScriptedDeployer {
    pub fn new(node_uuid: NodeId, hostname: impl Into<String>, poll_interval: Duration) -> Self {
        let hostname = hostname.into();
        let (discoveries, _) = watch::channel(0);
        let (calculations, _) = watch::channel(0);
        let (blocked, _) = watch::channel(false);
        Self {
            node_uuid,
            steady_state: Mutex::new(NodeState::new(node_uuid, hostname.clone())),
            hostname,
            poll_interval,
            script: Mutex::new(VecDeque::new()),
            seeds: Mutex::new(Vec::new()),
            discoveries,
            calculations,
            blocked,
            policy: Box::new(|_, _, _| StateChange::NoOp),
        }
    }

    /// Replace the calculation. The policy must be pure.
    pub fn with_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&Deployment, &DeploymentState, &NodeLocalState) -> StateChange<String>
            + Send
            + Sync
            + 'static,
    {
        self.policy = Box::new(policy);
        self
    }

    /// State reported once the script is exhausted.
    pub fn with_steady_state(self, node_state: NodeState) -> Self {
        *self.steady_state.lock() = node_state;
        self
    }

    /// Queue one discovery result.
    pub fn push_discovery(&self, result: Result<NodeState>) {
        self.script.lock().push_back(result);
    }

    /// Queue one failed discovery.
    pub fn fail_next_discovery(&self, message: &str) {
        self.push_discovery(Err(StewardError::discovery(message)));
    }

    /// Hold discoveries in flight until unblocked.
    pub fn block_discoveries(&self, blocked: bool) {
        self.blocked.send_replace(blocked);
    }

    /// Seeds passed to `discover_state`, oldest first.
    pub fn seeds(&self) -> Vec<NodeState> {
        self.seeds.lock().clone()
    }

    pub fn discovery_count(&self) -> usize {
        *self.discoveries.borrow()
    }

    pub fn calculation_count(&self) -> usize {
        *self.calculations.borrow()
    }

    pub async fn wait_for_discoveries(&self, count: usize) {
        let mut rx = self.discoveries.subscribe();
        let _ = rx.wait_for(|seen| *seen >= count).await;
    }

    pub async fn wait_for_calculations(&self, count: usize) {
        let mut rx = self.calculations.subscribe();
        let _ = rx.wait_for(|seen| *seen >= count).await;
    }
}

impl fmt::Debug for ScriptedDeployer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedDeployer")
            .field("node_uuid", &self.node_uuid)
            .field("hostname", &self.hostname)
            .field("poll_interval", &self.poll_interval)
            .field("discoveries", &self.discovery_count())
            .field("calculations", &self.calculation_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Deployer for ScriptedDeployer {
    type LocalState = NodeLocalState;
    type Action = String;

    fn node_uuid(&self) -> NodeId {
        self.node_uuid
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn discover_state(&self, previous: &NodeState) -> Result<NodeLocalState> {
        self.seeds.lock().push(previous.clone());
        self.discoveries.send_modify(|seen| *seen += 1);

        let mut blocked = self.blocked.subscribe();
        let _ = blocked.wait_for(|blocked| !*blocked).await;

        let next = self.script.lock().pop_front();
        let node_state = match next {
            Some(result) => result?,
            None => self.steady_state.lock().clone(),
        };
        Ok(NodeLocalState::new(node_state))
    }

    fn calculate_changes(
        &self,
        configuration: &Deployment,
        cluster_state: &DeploymentState,
        _registry: &dyn Registry,
        local_state: &NodeLocalState,
    ) -> StateChange<String> {
        self.calculations.send_modify(|seen| *seen += 1);
        (self.policy)(configuration, cluster_state, local_state)
    }
}
