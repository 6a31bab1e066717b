//! Volume convergence agent
//!
//! Keeps the datasets manifest on this node in line with configuration:
//! creates configured datasets that exist nowhere yet and destroys local ones
//! configured as deleted, unless they are still in use here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use steward_core::effects::{Registry, StateChangeExecutor};
use steward_core::{
    in_parallel, ClusterStateChange, Dataset, DatasetId, Deployment, DeploymentState,
    Manifestation, NodeId, NodeState, Result, StateChange, StewardError,
};

use crate::deployer::Deployer;
use crate::filter::NotInUseDatasets;
use crate::local_state::LocalState;

/// A volume as reported by the volume manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub dataset_id: DatasetId,
    pub maximum_size: Option<u64>,
    pub path: PathBuf,
}

impl Volume {
    fn manifestation(&self) -> Manifestation {
        let mut dataset = Dataset::new(self.dataset_id);
        dataset.maximum_size = self.maximum_size;
        Manifestation::primary(dataset)
    }
}

/// The node's volume manager.
#[async_trait]
pub trait VolumeBackend: Send + Sync {
    /// Volumes currently present. Must not modify anything.
    async fn list_volumes(&self) -> Result<Vec<Volume>>;

    /// Create a volume for `dataset`.
    async fn create_volume(&self, dataset: &Dataset) -> Result<Volume>;

    /// Destroy the volume holding `dataset_id`.
    async fn destroy_volume(&self, dataset_id: DatasetId) -> Result<()>;
}

#[async_trait]
impl<T: VolumeBackend + ?Sized> VolumeBackend for Arc<T> {
    async fn list_volumes(&self) -> Result<Vec<Volume>> {
        (**self).list_volumes().await
    }

    async fn create_volume(&self, dataset: &Dataset) -> Result<Volume> {
        (**self).create_volume(dataset).await
    }

    async fn destroy_volume(&self, dataset_id: DatasetId) -> Result<()> {
        (**self).destroy_volume(dataset_id).await
    }
}

/// Discovery result of the volume agent.
///
/// Only the node record is shared; the raw listing stays private.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLocalState {
    node_state: NodeState,
    volumes: Vec<Volume>,
}

impl VolumeLocalState {
    pub fn node_state(&self) -> &NodeState {
        &self.node_state
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    fn has_dataset(&self, dataset_id: &DatasetId) -> bool {
        self.node_state.has_manifestation(dataset_id)
    }
}

impl LocalState for VolumeLocalState {
    fn shared_state_changes(&self) -> Vec<ClusterStateChange> {
        vec![ClusterStateChange::Node(self.node_state.clone())]
    }
}

/// Leaf actions of the volume agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeAction {
    Create { dataset: Dataset },
    Destroy { dataset_id: DatasetId },
}

/// Volume agent for one node.
#[derive(Debug, Clone)]
pub struct VolumeDeployer<B> {
    node_uuid: NodeId,
    hostname: String,
    poll_interval: Duration,
    backend: Arc<B>,
}

impl<B: VolumeBackend> VolumeDeployer<B> {
    pub fn new(
        node_uuid: NodeId,
        hostname: impl Into<String>,
        poll_interval: Duration,
        backend: Arc<B>,
    ) -> Self {
        Self {
            node_uuid,
            hostname: hostname.into(),
            poll_interval,
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    fn configured_manifestations<'a>(
        &self,
        configuration: &'a Deployment,
    ) -> impl Iterator<Item = &'a Manifestation> {
        configuration
            .get_node(self.node_uuid)
            .into_iter()
            .flat_map(|node| node.manifestations.values())
    }
}

#[async_trait]
impl<B: VolumeBackend + 'static> Deployer for VolumeDeployer<B> {
    type LocalState = VolumeLocalState;
    type Action = VolumeAction;

    fn node_uuid(&self) -> NodeId {
        self.node_uuid
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Reports manifestations and paths only. Whatever `previous` says about
    /// applications or devices belongs to other agents and is left out.
    async fn discover_state(&self, _previous: &NodeState) -> Result<VolumeLocalState> {
        let volumes = self.backend.list_volumes().await.map_err(|e| match e {
            StewardError::Discovery { .. } => e,
            other => StewardError::discovery(format!("Listing volumes failed: {other}")),
        })?;

        let mut manifestations = BTreeMap::new();
        let mut paths = BTreeMap::new();
        for volume in &volumes {
            manifestations.insert(volume.dataset_id, volume.manifestation());
            paths.insert(volume.dataset_id, volume.path.clone());
        }
        debug!(node_uuid = %self.node_uuid, volumes = volumes.len(), "Discovered volumes");

        let mut node_state = NodeState::new(self.node_uuid, self.hostname.clone());
        node_state.manifestations = Some(manifestations);
        node_state.paths = Some(paths);
        Ok(VolumeLocalState {
            node_state,
            volumes,
        })
    }

    fn calculate_changes(
        &self,
        configuration: &Deployment,
        cluster_state: &DeploymentState,
        _registry: &dyn Registry,
        local_state: &VolumeLocalState,
    ) -> StateChange<VolumeAction> {
        let creates = self
            .configured_manifestations(configuration)
            .filter(|m| !m.dataset.deleted)
            .filter(|m| !local_state.has_dataset(&m.dataset_id()))
            .filter(|m| !cluster_state.manifest_elsewhere(&m.dataset_id(), self.node_uuid))
            .map(|m| {
                StateChange::Action(VolumeAction::Create {
                    dataset: m.dataset.clone(),
                })
            });

        let local_applications = cluster_state
            .get_node(self.node_uuid)
            .into_iter()
            .flat_map(NodeState::known_applications);
        let usage = NotInUseDatasets::new(self.node_uuid, local_applications, &configuration.leases);
        let destroys = self
            .configured_manifestations(configuration)
            .filter(|m| m.dataset.deleted && local_state.has_dataset(&m.dataset_id()))
            .filter(|m| !usage.is_in_use(&m.dataset_id()))
            .map(|m| {
                StateChange::Action(VolumeAction::Destroy {
                    dataset_id: m.dataset_id(),
                })
            });

        in_parallel(creates.chain(destroys).collect::<Vec<_>>())
    }
}

/// Carries out [`VolumeAction`]s against a backend.
#[derive(Debug, Clone)]
pub struct VolumeExecutor<B> {
    backend: Arc<B>,
}

impl<B> VolumeExecutor<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: VolumeBackend> StateChangeExecutor<VolumeAction> for VolumeExecutor<B> {
    async fn execute(&self, action: &VolumeAction) -> Result<()> {
        let result = match action {
            VolumeAction::Create { dataset } => {
                info!(dataset_id = %dataset.dataset_id, "Creating volume");
                self.backend.create_volume(dataset).await.map(|_| ())
            }
            VolumeAction::Destroy { dataset_id } => {
                info!(%dataset_id, "Destroying volume");
                self.backend.destroy_volume(*dataset_id).await
            }
        };
        result.map_err(|e| match e {
            StewardError::Execution { .. } => e,
            other => StewardError::execution(format!("{action:?}: {other}")),
        })
    }
}
