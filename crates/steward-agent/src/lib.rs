//! Steward Agent - node-local convergence
//!
//! Everything that runs on a node to bring it in line with the cluster's
//! desired configuration:
//!
//! - `LocalState` / `NodeLocalState`: discovery results and their shareable part
//! - `Deployer`: the per-resource-domain agent contract
//! - `NotInUseDatasets`: lease- and usage-aware filter for destructive actions
//! - `ConvergenceLoop`: the discover → share → calculate → apply driver
//! - `ConvergenceRuntime`: several loops with shared shutdown
//! - `VolumeDeployer`: the volume agent
//! - `AgentConfig`: layered configuration

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod convergence;
pub mod deployer;
pub mod filter;
pub mod local_state;
pub mod logging;
pub mod runtime;
pub mod time;
pub mod volumes;

pub use config::AgentConfig;
pub use convergence::{ClusterStatus, ConvergenceLoop, LoopPhase, LoopTiming};
pub use deployer::Deployer;
pub use filter::{DatasetReference, NotInUseDatasets};
pub use local_state::{LocalState, NodeLocalState};
pub use logging::init_tracing;
pub use runtime::{ConvergenceRuntime, StatusFanout};
pub use time::RealTimeHandler;
pub use volumes::{Volume, VolumeAction, VolumeBackend, VolumeDeployer, VolumeExecutor, VolumeLocalState};
