//! Executor for calculated state changes.

use async_trait::async_trait;

use crate::Result;

/// Carries out the leaf actions of a [`StateChange`](crate::StateChange).
///
/// Composition (sequential/parallel) is handled by
/// [`run_state_change`](crate::run_state_change); implementations only ever
/// see one leaf at a time.
#[async_trait]
pub trait StateChangeExecutor<A>: Send + Sync {
    /// Perform `action` against the local node.
    async fn execute(&self, action: &A) -> Result<()>;
}

#[async_trait]
impl<A, T> StateChangeExecutor<A> for std::sync::Arc<T>
where
    A: Sync,
    T: StateChangeExecutor<A> + ?Sized,
{
    async fn execute(&self, action: &A) -> Result<()> {
        (**self).execute(action).await
    }
}
