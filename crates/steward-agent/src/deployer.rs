//! The deployer contract
//!
//! A deployer is one convergence agent for one resource domain (volumes,
//! containers, ...). The loop driver calls it in a fixed rhythm:
//!
//! 1. `discover_state` with the last node record the cluster knows about
//! 2. share the result's `shared_state_changes()` with the control service
//! 3. fold those changes into the cluster snapshot
//! 4. `calculate_changes` against configuration, snapshot and local state
//! 5. execute the returned change, or sleep if it is `NoOp`
//!
//! Returning `NoOp` puts the loop to sleep for the whole `poll_interval`, and
//! only a control-service push that produces a non-`NoOp` change wakes it
//! early. An agent that needs rediscovery sooner than that must return some
//! other change.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use steward_core::effects::Registry;
use steward_core::{Deployment, DeploymentState, NodeId, NodeState, Result, StateChange};

use crate::local_state::LocalState;

/// Discovers local state and calculates the changes needed to converge it.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Discovery result handed from `discover_state` to `calculate_changes`.
    type LocalState: LocalState + fmt::Debug + 'static;

    /// Leaf action type of the changes this agent calculates.
    type Action: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// The node this agent runs on.
    fn node_uuid(&self) -> NodeId;

    /// Address of that node.
    fn hostname(&self) -> &str;

    /// Delay between discovery passes while converged.
    fn poll_interval(&self) -> Duration;

    /// Observe the resources this agent manages.
    ///
    /// `previous` is the last node record the cluster knows, which may hold
    /// facts from other agents. The result must carry only what this call
    /// observed itself. Backend failures surface as
    /// [`StewardError::Discovery`](steward_core::StewardError::Discovery).
    /// Discovery may be abandoned mid-flight, so it must only issue
    /// idempotent queries.
    async fn discover_state(&self, previous: &NodeState) -> Result<Self::LocalState>;

    /// Compute the next change. Must be deterministic and side-effect free.
    ///
    /// `cluster_state` already includes this cycle's discovery output.
    fn calculate_changes(
        &self,
        configuration: &Deployment,
        cluster_state: &DeploymentState,
        registry: &dyn Registry,
        local_state: &Self::LocalState,
    ) -> StateChange<Self::Action>;
}

/// Blanket implementation for Arc<T> where T: Deployer
#[async_trait]
impl<T: Deployer + ?Sized> Deployer for std::sync::Arc<T> {
    type LocalState = T::LocalState;
    type Action = T::Action;

    fn node_uuid(&self) -> NodeId {
        (**self).node_uuid()
    }

    fn hostname(&self) -> &str {
        (**self).hostname()
    }

    fn poll_interval(&self) -> Duration {
        (**self).poll_interval()
    }

    async fn discover_state(&self, previous: &NodeState) -> Result<Self::LocalState> {
        (**self).discover_state(previous).await
    }

    fn calculate_changes(
        &self,
        configuration: &Deployment,
        cluster_state: &DeploymentState,
        registry: &dyn Registry,
        local_state: &Self::LocalState,
    ) -> StateChange<Self::Action> {
        (**self).calculate_changes(configuration, cluster_state, registry, local_state)
    }
}
