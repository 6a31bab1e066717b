//! In-memory volume manager.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use steward_agent::{Volume, VolumeBackend};
use steward_core::{Dataset, DatasetId, Result, StewardError};

#[derive(Debug, Default)]
pub struct InMemoryVolumeBackend {
    volumes: Mutex<BTreeMap<DatasetId, Volume>>,
    unreachable: AtomicBool,
}

impl InMemoryVolumeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with a volume for each dataset.
    pub fn with_datasets(ids: impl IntoIterator<Item = DatasetId>) -> Self {
        let backend = Self::new();
        {
            let mut volumes = backend.volumes.lock();
            for dataset_id in ids {
                volumes.insert(dataset_id, Self::volume_for(dataset_id, None));
            }
        }
        backend
    }

    /// Make every call fail until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn dataset_ids(&self) -> Vec<DatasetId> {
        self.volumes.lock().keys().copied().collect()
    }

    fn volume_for(dataset_id: DatasetId, maximum_size: Option<u64>) -> Volume {
        Volume {
            dataset_id,
            maximum_size,
            path: PathBuf::from(format!("/steward/volumes/{dataset_id}")),
        }
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StewardError::discovery("volume manager unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl VolumeBackend for InMemoryVolumeBackend {
    async fn list_volumes(&self) -> Result<Vec<Volume>> {
        self.check_reachable()?;
        Ok(self.volumes.lock().values().cloned().collect())
    }

    async fn create_volume(&self, dataset: &Dataset) -> Result<Volume> {
        self.check_reachable()?;
        let volume = Self::volume_for(dataset.dataset_id, dataset.maximum_size);
        self.volumes.lock().insert(dataset.dataset_id, volume.clone());
        Ok(volume)
    }

    async fn destroy_volume(&self, dataset_id: DatasetId) -> Result<()> {
        self.check_reachable()?;
        self.volumes
            .lock()
            .remove(&dataset_id)
            .map(|_| ())
            .ok_or_else(|| StewardError::not_found(format!("volume {dataset_id}")))
    }
}
