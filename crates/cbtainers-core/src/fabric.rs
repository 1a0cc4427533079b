//! Capability interface onto the compute fabric
//!
//! The orchestrator only talks to these traits; `cbtainers-container`
//! implements them on Docker and the tests implement them in memory.

use crate::error::Result;
use crate::model::{ClusterNetwork, ComputeUnit, UnitRequest};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Grace period between stop and kill when tearing units down
pub const STOP_GRACE: Duration = Duration::from_secs(60);

#[async_trait]
pub trait FabricGateway: Send + Sync {
    /// Units whose name starts with `/<prefix>`, in no particular order
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ComputeUnit>>;

    /// Stop and remove every unit matching `prefix`, volumes included.
    ///
    /// Units that are already stopped or already gone are not an error.
    /// Returns how many units were removed.
    async fn delete_matching(&self, prefix: &str) -> Result<usize>;

    /// Fails with `Conflict` when a network of that name exists
    async fn create_network(&self, name: &str) -> Result<ClusterNetwork>;

    /// Fails with `NotFound` when no network of that name exists
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Returns once the image is fully present locally
    async fn pull_image(&self, reference: &str) -> Result<()>;

    async fn create_unit(&self, request: &UnitRequest) -> Result<ComputeUnit>;

    async fn start_unit(&self, id: &str) -> Result<()>;

    /// Current view of the unit including its address on `network`
    async fn inspect_unit(&self, id: &str, network: &str) -> Result<ComputeUnit>;
}

/// Remove `name` if it exists. Returns whether anything was removed.
pub async fn remove_network_if_present(fabric: &dyn FabricGateway, name: &str) -> Result<bool> {
    match fabric.remove_network(name).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            debug!(network = name, "network already absent");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
