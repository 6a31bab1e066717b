//! Desired-configuration model
//!
//! These records describe what the cluster *should* look like. They are
//! produced by the scheduler and handed to every agent as an immutable
//! snapshot once per cycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::identifiers::{DatasetId, NodeId};
use crate::leases::Leases;

/// A dataset, independent of the node it lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Cluster-wide identity of the dataset
    pub dataset_id: DatasetId,
    /// Marked for deletion by the operator
    #[serde(default)]
    pub deleted: bool,
    /// Size cap in bytes, if any
    #[serde(default)]
    pub maximum_size: Option<u64>,
    /// Free-form operator metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Dataset {
    /// A live dataset with no size cap or metadata.
    pub fn new(dataset_id: DatasetId) -> Self {
        Self {
            dataset_id,
            deleted: false,
            maximum_size: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Same dataset, marked for deletion.
    pub fn into_deleted(self) -> Self {
        Self {
            deleted: true,
            ..self
        }
    }
}

/// A dataset materialised on a particular node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifestation {
    /// The dataset being manifest
    pub dataset: Dataset,
    /// Whether this copy is the writable primary
    pub primary: bool,
}

impl Manifestation {
    /// A primary manifestation of `dataset`.
    pub fn primary(dataset: Dataset) -> Self {
        Self {
            dataset,
            primary: true,
        }
    }

    /// Shortcut to the manifest dataset's id.
    pub fn dataset_id(&self) -> DatasetId {
        self.dataset.dataset_id
    }
}

/// A manifestation mounted into an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedVolume {
    /// The manifestation backing the volume
    pub manifestation: Manifestation,
    /// Where the application sees it
    pub mountpoint: PathBuf,
}

/// A workload that may consume a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Unique name on its node
    pub name: String,
    /// Container image reference
    pub image: String,
    /// Volume in use, if any
    #[serde(default)]
    pub volume: Option<AttachedVolume>,
    /// Whether the workload is currently running
    #[serde(default = "default_running")]
    pub running: bool,
}

fn default_running() -> bool {
    true
}

impl Application {
    /// Dataset referenced by this application's volume, if it has one.
    pub fn dataset_id(&self) -> Option<DatasetId> {
        self.volume
            .as_ref()
            .map(|volume| volume.manifestation.dataset_id())
    }
}

/// Desired configuration of a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node identity
    pub uuid: NodeId,
    /// Applications that should run here, keyed by name
    #[serde(default)]
    pub applications: BTreeMap<String, Application>,
    /// Datasets that should be manifest here
    #[serde(default)]
    pub manifestations: BTreeMap<DatasetId, Manifestation>,
}

impl Node {
    /// An empty node configuration.
    pub fn new(uuid: NodeId) -> Self {
        Self {
            uuid,
            applications: BTreeMap::new(),
            manifestations: BTreeMap::new(),
        }
    }

    /// Builder-style helper adding a manifestation.
    pub fn with_manifestation(mut self, manifestation: Manifestation) -> Self {
        self.manifestations
            .insert(manifestation.dataset_id(), manifestation);
        self
    }

    /// Builder-style helper adding an application.
    pub fn with_application(mut self, application: Application) -> Self {
        self.applications
            .insert(application.name.clone(), application);
        self
    }
}

/// Desired configuration of the whole cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Deployment {
    /// Per-node configuration
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, Node>,
    /// Current dataset leases
    #[serde(default)]
    pub leases: Leases,
}

impl Deployment {
    /// Configuration of `node`, if the scheduler assigned it anything.
    pub fn get_node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(&node)
    }

    /// Builder-style helper replacing a node's configuration.
    pub fn with_node(mut self, uuid: NodeId, node: Node) -> Self {
        self.nodes.insert(uuid, node);
        self
    }

    /// Builder-style helper replacing the lease table.
    pub fn with_leases(self, leases: Leases) -> Self {
        Self { leases, ..self }
    }

    /// All manifestations configured anywhere in the cluster.
    pub fn all_manifestations(&self) -> impl Iterator<Item = (NodeId, &Manifestation)> {
        self.nodes.iter().flat_map(|(uuid, node)| {
            node.manifestations
                .values()
                .map(move |manifestation| (*uuid, manifestation))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn dataset(n: u128) -> Dataset {
        Dataset::new(DatasetId::from_uuid(Uuid::from_u128(n)))
    }

    #[test]
    fn application_without_volume_references_nothing() {
        let app = Application {
            name: "web".into(),
            image: "nginx".into(),
            volume: None,
            running: true,
        };
        assert_eq!(app.dataset_id(), None);
    }

    #[test]
    fn application_with_volume_references_its_dataset() {
        let app = Application {
            name: "db".into(),
            image: "postgres".into(),
            volume: Some(AttachedVolume {
                manifestation: Manifestation::primary(dataset(1)),
                mountpoint: "/var/lib/postgresql".into(),
            }),
            running: true,
        };
        assert_eq!(app.dataset_id(), Some(dataset(1).dataset_id));
    }

    #[test]
    fn all_manifestations_spans_nodes() {
        let a = NodeId::from_uuid(Uuid::from_u128(10));
        let b = NodeId::from_uuid(Uuid::from_u128(11));
        let deployment = Deployment::default()
            .with_node(a, Node::new(a).with_manifestation(Manifestation::primary(dataset(1))))
            .with_node(b, Node::new(b).with_manifestation(Manifestation::primary(dataset(2))));

        let found: Vec<_> = deployment
            .all_manifestations()
            .map(|(node, m)| (node, m.dataset_id()))
            .collect();
        assert_eq!(
            found,
            vec![(a, dataset(1).dataset_id), (b, dataset(2).dataset_id)]
        );
    }

    #[test]
    fn deleted_dataset_keeps_identity() {
        let live = dataset(3);
        let deleted = live.clone().into_deleted();
        assert!(deleted.deleted);
        assert_eq!(deleted.dataset_id, live.dataset_id);
    }
}
