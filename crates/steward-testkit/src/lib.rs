//! Steward Testing Infrastructure
//!
//! Deterministic stand-ins for the collaborators a convergence loop talks to,
//! plus model fixtures.
//!
//! Add this to a crate's dev-dependencies and use it from `tests/`:
//! ```toml
//! [dev-dependencies]
//! steward-testkit = { path = "../steward-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

pub mod control;
pub mod deployer;
pub mod executor;
pub mod fixtures;
pub mod time;
pub mod volumes;

pub use control::RecordingControlChannel;
pub use deployer::ScriptedDeployer;
pub use executor::RecordingExecutor;
pub use fixtures::*;
pub use time::SimulatedTimeHandler;
pub use volumes::InMemoryVolumeBackend;
