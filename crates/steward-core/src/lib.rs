//! Steward Core - cluster model and convergence effects
//!
//! This crate provides the data model and effect interfaces shared by every
//! convergence agent. It contains no agent logic and performs no I/O.
//!
//! # Contents
//!
//! ## Cluster model
//! - `Deployment`: desired configuration for every node, plus dataset leases
//! - `DeploymentState`: observed state for every node
//! - `NodeState`: one node's observations, with unknown fields left `None`
//! - `ClusterStateChange`: a fact an agent shares with the control service
//!
//! ## State changes
//! - `StateChange<A>`: composable description of convergence work
//! - `sequentially` / `in_parallel`: normalising combinators
//! - `run_state_change`: drive a change tree through an executor
//!
//! ## Effect interfaces
//! - `PhysicalTimeEffects`, `ControlChannel`, `StateChangeExecutor`, `Registry`

#![allow(missing_docs)]
#![forbid(unsafe_code)]

/// Unified error handling
pub mod errors;

/// Node and dataset identifiers
pub mod identifiers;

/// Dataset leases
pub mod leases;

/// Desired configuration model
pub mod model;

/// Observed state model
pub mod state;

/// State change algebra
pub mod state_change;

/// Pure effect interfaces (no implementations)
pub mod effects;

pub use errors::{Result, StewardError};
pub use identifiers::{DatasetId, NodeId};
pub use leases::{Lease, Leases};
pub use model::{Application, AttachedVolume, Dataset, Deployment, Manifestation, Node};
pub use state::{ClusterStateChange, DeploymentState, NodeState};
pub use state_change::{in_parallel, run_state_change, sequentially, StateChange};
