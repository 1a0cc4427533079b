use cbtainers_core::{
    ClusterSpec, HttpProbe, Orchestrator, OrchestratorSettings, ProvisionError, RemoteExecutor,
};
use colored::Colorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn handle(
    spec: &ClusterSpec,
    settings: OrchestratorSettings,
    json: bool,
) -> anyhow::Result<()> {
    let fabric = Arc::new(super::connect().await?);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling the running command");
                cancel.cancel();
            }
        }
    });

    let executor = RemoteExecutor::new(fabric.clone()).with_cancellation(cancel);
    let probe = Arc::new(HttpProbe::new(
        settings.service_port,
        settings.probe_path.clone(),
    )?);
    let orchestrator = Orchestrator::new(fabric, executor, probe, settings);

    let cluster = match orchestrator.run(spec).await {
        Ok(Some(cluster)) => cluster,
        Ok(None) => {
            println!("done");
            return Ok(());
        }
        Err(err) => {
            report_failure(&err, &spec.prefix);
            return Err(err.into());
        }
    };

    match cluster
        .members(orchestrator.executor(), &spec.credentials)
        .await
    {
        Ok(members) => info!(count = members.len(), members = %members.join(" | "), "cluster members"),
        Err(e) => warn!(error = %e, "could not list cluster members"),
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&cluster)?);
    } else {
        println!("done");
    }
    Ok(())
}

fn report_failure(err: &ProvisionError, prefix: &str) {
    error!(step = %err.step, error = %err.source, "provisioning failed");
    if err.cleanup.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("{}", "Resources left behind:".yellow());
    for action in err.cleanup.actions() {
        eprintln!("  • {}", action);
    }
    eprintln!();
    eprintln!(
        "Remove them with: {}",
        format!("cbtainers --teardown --prefix {}", prefix).cyan()
    );
}
