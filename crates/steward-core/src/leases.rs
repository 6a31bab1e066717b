//! Dataset leases
//!
//! A lease pins a dataset to a node: while it is held, no other node may move
//! or destroy the dataset, and the holder treats it as in use. Leases are part
//! of the desired configuration and reach agents with every push.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::identifiers::{DatasetId, NodeId};
use crate::{Result, StewardError};

/// A single lease record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Leased dataset
    pub dataset_id: DatasetId,
    /// Owning node
    pub node_id: NodeId,
    /// Expiry as milliseconds since the Unix epoch; `None` never expires
    #[serde(default)]
    pub expiration: Option<u64>,
}

impl Lease {
    /// Whether the lease has lapsed at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expiration.is_some_and(|expiry| expiry <= now_ms)
    }
}

/// Lease table keyed by dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Leases(BTreeMap<DatasetId, Lease>);

impl Leases {
    /// An empty lease table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease on `dataset_id`, if any.
    pub fn get(&self, dataset_id: &DatasetId) -> Option<&Lease> {
        self.0.get(dataset_id)
    }

    /// Whether `dataset_id` is leased to anyone.
    pub fn contains(&self, dataset_id: &DatasetId) -> bool {
        self.0.contains_key(dataset_id)
    }

    /// Whether `dataset_id` is leased to `node_id` specifically.
    pub fn is_held_by(&self, dataset_id: &DatasetId, node_id: NodeId) -> bool {
        self.get(dataset_id)
            .is_some_and(|lease| lease.node_id == node_id)
    }

    /// Iterate leases in dataset order.
    pub fn iter(&self) -> impl Iterator<Item = &Lease> {
        self.0.values()
    }

    /// Number of leases held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no leases are held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Acquire or renew a lease on `dataset_id` for `node_id`.
    ///
    /// `duration` of `None` makes the lease permanent. Fails if another node
    /// holds an unexpired lease on the dataset.
    pub fn acquire(
        &self,
        now_ms: u64,
        dataset_id: DatasetId,
        node_id: NodeId,
        duration: Option<Duration>,
    ) -> Result<Self> {
        if let Some(existing) = self.get(&dataset_id) {
            if existing.node_id != node_id && !existing.is_expired(now_ms) {
                return Err(StewardError::lease(format!(
                    "dataset {dataset_id} is leased to node {}",
                    existing.node_id
                )));
            }
        }

        let expiration = duration.map(|d| now_ms.saturating_add(d.as_millis() as u64));
        let mut leases = self.0.clone();
        leases.insert(
            dataset_id,
            Lease {
                dataset_id,
                node_id,
                expiration,
            },
        );
        Ok(Self(leases))
    }

    /// Release the lease on `dataset_id` held by `node_id`.
    ///
    /// Releasing a dataset that carries no lease is a no-op.
    pub fn release(&self, dataset_id: DatasetId, node_id: NodeId) -> Result<Self> {
        match self.get(&dataset_id) {
            None => Ok(self.clone()),
            Some(existing) if existing.node_id != node_id => Err(StewardError::lease(format!(
                "node {node_id} cannot release lease on {dataset_id} held by {}",
                existing.node_id
            ))),
            Some(_) => {
                let mut leases = self.0.clone();
                leases.remove(&dataset_id);
                Ok(Self(leases))
            }
        }
    }

    /// Drop every lease that has expired at `now_ms`.
    pub fn expire(&self, now_ms: u64) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(_, lease)| !lease.is_expired(now_ms))
                .map(|(id, lease)| (*id, lease.clone()))
                .collect(),
        )
    }
}

impl FromIterator<Lease> for Leases {
    fn from_iter<I: IntoIterator<Item = Lease>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|lease| (lease.dataset_id, lease))
                .collect(),
        )
    }
}
