//! Cleanup ledger: compensating actions recorded as resources come up
//!
//! Actions are plain records interpreted against a [`FabricGateway`], so a
//! ledger can be logged, serialized, or rebuilt for a prefix after the fact.

use crate::error::{Error, Result};
use crate::fabric::{FabricGateway, remove_network_if_present};
use crate::model::ClusterNames;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CleanupAction {
    RemoveNetwork { name: String },
    /// Bulk removal of every unit whose name starts with the prefix
    DeleteUnits { prefix: String },
    DeleteProxy { name: String },
}

impl CleanupAction {
    pub async fn execute(&self, fabric: &dyn FabricGateway) -> Result<()> {
        match self {
            CleanupAction::RemoveNetwork { name } => {
                remove_network_if_present(fabric, name).await?;
            }
            CleanupAction::DeleteUnits { prefix } => {
                let removed = fabric.delete_matching(prefix).await?;
                debug!(prefix = %prefix, removed, "units removed");
            }
            CleanupAction::DeleteProxy { name } => {
                fabric.delete_matching(name).await?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupAction::RemoveNetwork { name } => write!(f, "remove network {}", name),
            CleanupAction::DeleteUnits { prefix } => write!(f, "delete units {}*", prefix),
            CleanupAction::DeleteProxy { name } => write!(f, "delete proxy {}", name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupLedger {
    actions: Vec<CleanupAction>,
}

impl CleanupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything a full run for `names` may have left behind
    pub fn for_cluster(names: &ClusterNames, proxy_name: &str) -> Self {
        let mut ledger = Self::new();
        ledger.register(CleanupAction::RemoveNetwork {
            name: names.network.clone(),
        });
        ledger.register(CleanupAction::DeleteUnits {
            prefix: names.prefix.clone(),
        });
        ledger.register(CleanupAction::DeleteProxy {
            name: proxy_name.to_string(),
        });
        ledger
    }

    pub fn register(&mut self, action: CleanupAction) {
        debug!(action = %action, "cleanup registered");
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[CleanupAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Attempt every action in registration order.
    ///
    /// Actions that fail are attempted once more after the full pass, since
    /// a later action may release what they were blocked on (a network with
    /// units still attached). Failures that persist are aggregated.
    pub async fn run_all(&self, fabric: &dyn FabricGateway) -> Result<()> {
        let mut deferred = Vec::new();
        for action in &self.actions {
            info!(action = %action, "cleanup");
            if let Err(e) = action.execute(fabric).await {
                warn!(action = %action, error = %e, "cleanup failed, will retry after remaining actions");
                deferred.push(action);
            }
        }

        let mut failures = Vec::new();
        for action in deferred {
            if let Err(e) = action.execute(fabric).await {
                warn!(action = %action, error = %e, "cleanup failed");
                failures.push(format!("{}: {}", action, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Teardown { failures })
        }
    }
}
