//! DHT maintenance traits.
#![warn(missing_docs)]
use std::sync::Arc;

use async_trait::async_trait;

/// A periodic maintenance task with its own schedule.
///
/// Implementors run one pass per tick forever. The stabilization and
/// heartbeat loops both wear this trait so a node can spawn them the same
/// way.
#[async_trait]
pub trait Periodic {
    /// Enter the loop and never return. Errors of a single pass are logged
    /// and the loop carries on.
    async fn wait(self: Arc<Self>);
}
