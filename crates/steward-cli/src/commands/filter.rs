// Offline run of the usage filter

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

use steward_agent::NotInUseDatasets;
use steward_core::{Application, Lease, Leases, NodeId};

/// Input for `filter-datasets`.
#[derive(Debug, Deserialize)]
pub struct FilterSnapshot {
    pub node_uuid: String,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub leases: Vec<Lease>,
    pub candidates: Vec<String>,
}

/// Print each candidate dataset id that is not in use on the node.
pub fn filter_datasets(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot: FilterSnapshot = serde_json::from_str(&content).context("invalid snapshot")?;
    for dataset_id in run_filter(&snapshot)? {
        println!("{dataset_id}");
    }
    Ok(())
}

/// Candidates from `snapshot` that may be acted on, in input order.
pub fn run_filter(snapshot: &FilterSnapshot) -> anyhow::Result<Vec<String>> {
    let node_id: NodeId = snapshot
        .node_uuid
        .parse()
        .context("node_uuid is not a UUID")?;
    let leases: Leases = snapshot.leases.iter().cloned().collect();
    let usage = NotInUseDatasets::new(node_id, &snapshot.applications, &leases);
    let remaining = usage.filter(snapshot.candidates.iter().cloned())?;
    tracing::debug!(
        candidates = snapshot.candidates.len(),
        remaining = remaining.len(),
        "Filtered datasets"
    );
    Ok(remaining)
}
