use cbtainers_core::{CleanupLedger, ClusterSpec, OrchestratorSettings};
use tracing::info;

/// Remove everything a run with `spec.prefix` may have created
pub async fn handle(spec: &ClusterSpec, settings: &OrchestratorSettings) -> anyhow::Result<()> {
    ClusterSpec {
        delete_only: true,
        ..spec.clone()
    }
    .validate_with_proxy(&settings.proxy_name)?;
    let fabric = super::connect().await?;

    let ledger = CleanupLedger::for_cluster(&spec.names(), &settings.proxy_name);
    info!(prefix = %spec.prefix, actions = ledger.len(), "tearing down");
    ledger.run_all(&fabric).await?;

    println!("done");
    Ok(())
}
