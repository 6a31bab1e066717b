//! Observed cluster state
//!
//! `NodeState` records are what agents discover and report. Every resource
//! field is optional: `None` means whoever produced the record does not know
//! about that kind of resource, which is different from knowing there are none
//! (`Some` of an empty map). Folding a record into a `DeploymentState` only
//! overwrites the fields it knows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::identifiers::{DatasetId, NodeId};
use crate::model::{Application, Dataset, Manifestation};

/// Observed state of a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// Node identity
    pub uuid: NodeId,
    /// Address the node is reachable on
    pub hostname: String,
    /// Applications running on the node
    #[serde(default)]
    pub applications: Option<BTreeMap<String, Application>>,
    /// Datasets manifest on the node
    #[serde(default)]
    pub manifestations: Option<BTreeMap<DatasetId, Manifestation>>,
    /// Local filesystem paths of manifest datasets
    #[serde(default)]
    pub paths: Option<BTreeMap<DatasetId, PathBuf>>,
    /// Block devices backing attached datasets
    #[serde(default)]
    pub devices: Option<BTreeMap<DatasetId, PathBuf>>,
}

impl NodeState {
    /// A record that knows the node's identity and nothing else.
    pub fn new(uuid: NodeId, hostname: impl Into<String>) -> Self {
        Self {
            uuid,
            hostname: hostname.into(),
            applications: None,
            manifestations: None,
            paths: None,
            devices: None,
        }
    }

    /// Merge `other` on top of `self`, keeping fields `other` leaves unknown.
    pub fn merged_with(&self, other: &NodeState) -> NodeState {
        NodeState {
            uuid: other.uuid,
            hostname: other.hostname.clone(),
            applications: other
                .applications
                .clone()
                .or_else(|| self.applications.clone()),
            manifestations: other
                .manifestations
                .clone()
                .or_else(|| self.manifestations.clone()),
            paths: other.paths.clone().or_else(|| self.paths.clone()),
            devices: other.devices.clone().or_else(|| self.devices.clone()),
        }
    }

    /// Running applications known on this node, or none when unknown.
    pub fn known_applications(&self) -> impl Iterator<Item = &Application> {
        self.applications.iter().flat_map(|apps| apps.values())
    }

    /// Whether the node is known to have `dataset_id` manifest.
    pub fn has_manifestation(&self, dataset_id: &DatasetId) -> bool {
        self.manifestations
            .as_ref()
            .is_some_and(|m| m.contains_key(dataset_id))
    }
}

/// Observed state of the whole cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Per-node observations
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, NodeState>,
    /// Datasets that exist but are not manifest on any node
    #[serde(default)]
    pub nonmanifest_datasets: BTreeMap<DatasetId, Dataset>,
}

impl DeploymentState {
    /// Observed state of `uuid`, if anything has been reported.
    pub fn get_node(&self, uuid: NodeId) -> Option<&NodeState> {
        self.nodes.get(&uuid)
    }

    /// Observed state of `uuid`, or an identity-only record when nothing has
    /// been reported yet.
    pub fn node_or_empty(&self, uuid: NodeId, hostname: &str) -> NodeState {
        self.get_node(uuid)
            .cloned()
            .unwrap_or_else(|| NodeState::new(uuid, hostname))
    }

    /// Nodes other than `uuid` known to have `dataset_id` manifest.
    pub fn manifest_elsewhere(&self, dataset_id: &DatasetId, uuid: NodeId) -> bool {
        self.nodes
            .iter()
            .any(|(other, state)| *other != uuid && state.has_manifestation(dataset_id))
    }

    /// Fold a sequence of changes into a new snapshot, in order.
    pub fn apply_changes<'a>(
        &self,
        changes: impl IntoIterator<Item = &'a ClusterStateChange>,
    ) -> DeploymentState {
        changes
            .into_iter()
            .fold(self.clone(), |state, change| change.update_cluster_state(&state))
    }
}

/// A fact about the cluster that an agent shares with the control service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterStateChange {
    /// Observations about one node
    Node(NodeState),
    /// The complete set of datasets not manifest anywhere
    NonManifestDatasets(BTreeMap<DatasetId, Dataset>),
}

impl ClusterStateChange {
    /// Return `state` with this change applied. The input is not modified.
    pub fn update_cluster_state(&self, state: &DeploymentState) -> DeploymentState {
        let mut updated = state.clone();
        match self {
            Self::Node(node_state) => {
                let merged = match state.nodes.get(&node_state.uuid) {
                    Some(existing) => existing.merged_with(node_state),
                    None => node_state.clone(),
                };
                updated.nodes.insert(node_state.uuid, merged);
            }
            Self::NonManifestDatasets(datasets) => {
                updated.nonmanifest_datasets = datasets.clone();
            }
        }
        updated
    }
}

impl From<NodeState> for ClusterStateChange {
    fn from(node_state: NodeState) -> Self {
        Self::Node(node_state)
    }
}
