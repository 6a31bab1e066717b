//! Opaque registry handle.
//!
//! Agents receive a registry reference in `calculate_changes` and may downcast
//! it to whatever concrete type their deployment wires in. Nothing in the
//! convergence core inspects it.

use std::any::Any;
use std::fmt;

pub trait Registry: Send + Sync + fmt::Debug {
    /// Access the concrete registry for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Registry used when a deployment has nothing to pass through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyRegistry;

impl Registry for EmptyRegistry {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
