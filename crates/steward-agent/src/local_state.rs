//! Discovery results
//!
//! A `LocalState` is what one `discover_state` pass learned about the node.
//! The loop driver ships `shared_state_changes()` to the control service and
//! hands the whole value back to the same agent's `calculate_changes`. Values
//! are immutable; every pass produces a fresh one.

use steward_core::{ClusterStateChange, NodeState};

/// The result of discovering local state.
pub trait LocalState: Send + Sync {
    /// The part of the local state that must reach the control service.
    ///
    /// Pure projection: no side effects, no failure, same output every call.
    fn shared_state_changes(&self) -> Vec<ClusterStateChange>;
}

/// A `LocalState` made of a single node record, all of which is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLocalState {
    node_state: NodeState,
}

impl NodeLocalState {
    pub fn new(node_state: NodeState) -> Self {
        Self { node_state }
    }

    /// The discovered node record.
    pub fn node_state(&self) -> &NodeState {
        &self.node_state
    }
}

impl LocalState for NodeLocalState {
    fn shared_state_changes(&self) -> Vec<ClusterStateChange> {
        vec![ClusterStateChange::Node(self.node_state.clone())]
    }
}

impl From<NodeState> for NodeLocalState {
    fn from(node_state: NodeState) -> Self {
        Self::new(node_state)
    }
}
