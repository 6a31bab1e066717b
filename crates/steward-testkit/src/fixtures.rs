//! Model fixtures with stable, readable identifiers.

use uuid::Uuid;

use steward_core::{
    Application, AttachedVolume, Dataset, DatasetId, Lease, Manifestation, NodeId, NodeState,
};

/// Node id `n`, e.g. `node_id(1)` is `00000000-...-000000000001`.
pub fn node_id(n: u128) -> NodeId {
    NodeId::from_uuid(Uuid::from_u128(n))
}

/// Dataset id `n`, offset so it never collides with a node id.
pub fn dataset_id(n: u128) -> DatasetId {
    DatasetId::from_uuid(Uuid::from_u128((1 << 64) + n))
}

pub fn hostname(n: u128) -> String {
    format!("10.0.0.{n}")
}

pub fn primary_manifestation(n: u128) -> Manifestation {
    Manifestation::primary(Dataset::new(dataset_id(n)))
}

/// A running application with dataset `n` attached, or none.
pub fn application_using(name: &str, dataset: Option<u128>) -> Application {
    Application {
        name: name.to_string(),
        image: format!("registry.local/{name}:latest"),
        volume: dataset.map(|n| AttachedVolume {
            manifestation: primary_manifestation(n),
            mountpoint: format!("/var/lib/{name}").into(),
        }),
        running: true,
    }
}

/// A lease on dataset `dataset` held by node `node`, with no expiry.
pub fn lease(dataset: u128, node: u128) -> Lease {
    Lease {
        dataset_id: dataset_id(dataset),
        node_id: node_id(node),
        expiration: None,
    }
}

/// A node record that knows the given applications and nothing else.
pub fn node_state_with_applications(node: u128, applications: Vec<Application>) -> NodeState {
    let mut state = NodeState::new(node_id(node), hostname(node));
    state.applications = Some(
        applications
            .into_iter()
            .map(|app| (app.name.clone(), app))
            .collect(),
    );
    state
}
