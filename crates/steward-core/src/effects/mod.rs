//! Effect interfaces for convergence agents
//!
//! Pure signatures only. Agents and the loop driver receive implementations as
//! explicit parameters, so tests can substitute simulated clocks and recording
//! channels without any global state.
//!
//! - `PhysicalTimeEffects`: wall-clock reads and sleeping
//! - `ControlChannel`: shipping shared state to the control service
//! - `StateChangeExecutor`: carrying out calculated actions
//! - `Registry`: opaque handle passed through to `calculate_changes`

pub mod control;
pub mod execution;
pub mod registry;
pub mod time;

pub use control::ControlChannel;
pub use execution::StateChangeExecutor;
pub use registry::{EmptyRegistry, Registry};
pub use time::PhysicalTimeEffects;
