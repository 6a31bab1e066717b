//! Control service channel.

use async_trait::async_trait;

use crate::state::ClusterStateChange;
use crate::Result;

/// Outbound half of the connection to the control service.
///
/// Receives exactly what `LocalState::shared_state_changes()` produced. The
/// transport and its wire format are outside this crate.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Ship locally observed changes. Failures are reported as
    /// [`StewardError::Control`](crate::StewardError::Control).
    async fn send_state_changes(&self, changes: Vec<ClusterStateChange>) -> Result<()>;
}

#[async_trait]
impl<T: ControlChannel + ?Sized> ControlChannel for std::sync::Arc<T> {
    async fn send_state_changes(&self, changes: Vec<ClusterStateChange>) -> Result<()> {
        (**self).send_state_changes(changes).await
    }
}
