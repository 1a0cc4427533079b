//! Provisioning state machine
//!
//! Steps run strictly in order and the first failure aborts the run. Nothing
//! is rolled back here: every resource that came up is recorded in the
//! [`CleanupLedger`], which travels back to the caller on success and on
//! failure alike.

use crate::commands;
use crate::error::{Error, Result};
use crate::exec::RemoteExecutor;
use crate::fabric::{FabricGateway, remove_network_if_present};
use crate::ledger::{CleanupAction, CleanupLedger};
use crate::model::{
    ClusterNames, ClusterNetwork, ClusterSpec, ComputeUnit, Credentials, PortForward, UnitRequest,
};
use crate::readiness::{self, HEALTH_PATH, ReadinessProbe, SERVICE_PORT};
use crate::retry::{self, RetryPolicy};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const PROXY_IMAGE: &str = "verb/socat";
pub const PROXY_NAME: &str = "cb-server-proxy";
pub const PROXY_LISTEN_PORT: u16 = 8080;

/// Tunables around the fixed provisioning sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub proxy_image: String,
    /// Host-wide singleton; any unit with this name is replaced
    pub proxy_name: String,
    pub proxy_listen_port: u16,
    /// Server admin port, published on the same port on the host
    pub service_port: u16,
    pub probe_host: String,
    pub probe_path: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            retry_attempts: retry::DEFAULT_ATTEMPTS,
            retry_delay: retry::DEFAULT_DELAY,
            proxy_image: PROXY_IMAGE.to_string(),
            proxy_name: PROXY_NAME.to_string(),
            proxy_listen_port: PROXY_LISTEN_PORT,
            service_port: SERVICE_PORT,
            probe_host: "localhost".to_string(),
            probe_path: HEALTH_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Validate,
    PreClean,
    PullImage,
    CreateNetwork,
    CreateNodes,
    StartProxy,
    WaitReady,
    InitNodes,
    JoinCluster,
    Rebalance,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Validate => "validate",
            Step::PreClean => "pre-clean",
            Step::PullImage => "image pull",
            Step::CreateNetwork => "network creation",
            Step::CreateNodes => "node creation",
            Step::StartProxy => "proxy setup",
            Step::WaitReady => "readiness wait",
            Step::InitNodes => "node initialization",
            Step::JoinCluster => "cluster join",
            Step::Rebalance => "rebalance",
        };
        f.write_str(name)
    }
}

/// A failed run: where it stopped, why, and what it had created by then
#[derive(Error, Debug)]
#[error("provisioning failed during {step}: {source}")]
pub struct ProvisionError {
    pub step: Step,
    #[source]
    pub source: Error,
    pub cleanup: CleanupLedger,
}

impl ProvisionError {
    fn at(step: Step, source: Error, ledger: &CleanupLedger) -> Self {
        Self {
            step,
            source,
            cleanup: ledger.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterResult {
    pub nodes: Vec<ComputeUnit>,
    pub network: ClusterNetwork,
    pub cleanup: CleanupLedger,
}

impl ClusterResult {
    pub fn first_node(&self) -> Option<&ComputeUnit> {
        self.nodes.first()
    }

    /// Cluster membership as reported by the first node
    pub async fn members(
        &self,
        executor: &RemoteExecutor,
        credentials: &Credentials,
    ) -> Result<Vec<String>> {
        let first = self
            .first_node()
            .ok_or_else(|| Error::InvalidSpec("cluster has no nodes".into()))?;
        let output = executor
            .exec(&first.id, &commands::server_list(credentials))
            .await?;
        Ok(commands::parse_server_list(&output))
    }

    /// Run the ledger; consumes the result so it happens once
    pub async fn teardown(self, fabric: &dyn FabricGateway) -> Result<()> {
        self.cleanup.run_all(fabric).await
    }
}

pub struct Orchestrator {
    fabric: Arc<dyn FabricGateway>,
    executor: RemoteExecutor,
    probe: Arc<dyn ReadinessProbe>,
    retry: RetryPolicy,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        fabric: Arc<dyn FabricGateway>,
        executor: RemoteExecutor,
        probe: Arc<dyn ReadinessProbe>,
        settings: OrchestratorSettings,
    ) -> Self {
        let retry = RetryPolicy::new(settings.retry_attempts, settings.retry_delay);
        Self {
            fabric,
            executor,
            probe,
            retry,
            settings,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn fabric(&self) -> &dyn FabricGateway {
        self.fabric.as_ref()
    }

    pub fn executor(&self) -> &RemoteExecutor {
        &self.executor
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Provision the cluster described by `spec`.
    ///
    /// Returns `Ok(None)` for a delete-only spec once leftovers are gone.
    pub async fn run(&self, spec: &ClusterSpec) -> std::result::Result<Option<ClusterResult>, ProvisionError> {
        let mut ledger = CleanupLedger::new();

        spec.validate_with_proxy(&self.settings.proxy_name)
            .map_err(|e| ProvisionError::at(Step::Validate, e, &ledger))?;
        let names = spec.names();

        self.pre_clean(&names)
            .await
            .map_err(|e| ProvisionError::at(Step::PreClean, e, &ledger))?;

        if spec.delete_only {
            info!(prefix = %names.prefix, "delete-only run finished");
            return Ok(None);
        }

        info!(image = %spec.image, "pulling server image");
        self.fabric
            .pull_image(&spec.image)
            .await
            .map_err(|e| ProvisionError::at(Step::PullImage, e, &ledger))?;

        let network = self
            .fabric
            .create_network(&names.network)
            .await
            .map_err(|e| ProvisionError::at(Step::CreateNetwork, e, &ledger))?;
        info!(network = %network.name, id = %network.id, "network created");
        ledger.register(CleanupAction::RemoveNetwork {
            name: names.network.clone(),
        });

        let nodes = self
            .create_nodes(spec, &names, &network, &mut ledger)
            .await
            .map_err(|e| ProvisionError::at(Step::CreateNodes, e, &ledger))?;

        self.start_proxy(&nodes[0], &network, &mut ledger)
            .await
            .map_err(|e| ProvisionError::at(Step::StartProxy, e, &ledger))?;

        readiness::wait_until_ready(self.probe.as_ref(), &self.retry, &self.settings.probe_host)
            .await
            .map_err(|e| ProvisionError::at(Step::WaitReady, e, &ledger))?;

        let init = commands::cluster_init(&spec.credentials, &names.cluster);
        for node in &nodes {
            info!(unit = %node.hostname(), "initialising node");
            self.retry
                .run("cluster init", || self.executor.exec(&node.id, &init))
                .await
                .map_err(|e| ProvisionError::at(Step::InitNodes, e, &ledger))?;
        }

        if nodes.len() > 1 {
            self.join(&nodes, &spec.credentials)
                .await
                .map_err(|e| ProvisionError::at(Step::JoinCluster, e, &ledger))?;

            info!("rebalancing cluster");
            let rebalance = commands::rebalance(&spec.credentials);
            self.retry
                .run("rebalance", || self.executor.exec(&nodes[0].id, &rebalance))
                .await
                .map_err(|e| ProvisionError::at(Step::Rebalance, e, &ledger))?;
        }

        info!(prefix = %names.prefix, nodes = nodes.len(), "cluster ready");
        Ok(Some(ClusterResult {
            nodes,
            network,
            cleanup: ledger,
        }))
    }

    /// Remove leftovers of an earlier run with the same prefix and any proxy
    async fn pre_clean(&self, names: &ClusterNames) -> Result<()> {
        let removed = self.fabric.delete_matching(&names.prefix).await?;
        if removed > 0 {
            info!(prefix = %names.prefix, removed, "removed leftover units");
        }
        self.fabric.delete_matching(&self.settings.proxy_name).await?;
        if remove_network_if_present(self.fabric.as_ref(), &names.network).await? {
            info!(network = %names.network, "removed leftover network");
        }
        Ok(())
    }

    async fn create_nodes(
        &self,
        spec: &ClusterSpec,
        names: &ClusterNames,
        network: &ClusterNetwork,
        ledger: &mut CleanupLedger,
    ) -> Result<Vec<ComputeUnit>> {
        let mut nodes = Vec::with_capacity(spec.size);
        for index in 0..spec.size {
            let request = UnitRequest::node(names.node(index), &spec.image, network);
            let unit = self.fabric.create_unit(&request).await?;
            if index == 0 {
                ledger.register(CleanupAction::DeleteUnits {
                    prefix: names.prefix.clone(),
                });
            }
            self.fabric.start_unit(&unit.id).await?;
            let unit = self.fabric.inspect_unit(&unit.id, &network.name).await?;
            info!(
                unit = %unit.hostname(),
                address = unit.address.as_deref().unwrap_or("-"),
                "node started"
            );
            nodes.push(unit);
        }
        Ok(nodes)
    }

    /// Publish the first node's admin port on the host through socat
    async fn start_proxy(
        &self,
        target: &ComputeUnit,
        network: &ClusterNetwork,
        ledger: &mut CleanupLedger,
    ) -> Result<()> {
        let address = target
            .address
            .as_deref()
            .ok_or_else(|| Error::MissingAddress {
                unit: target.hostname().to_string(),
                network: network.name.clone(),
            })?;

        self.fabric.pull_image(&self.settings.proxy_image).await?;

        let request = UnitRequest {
            name: self.settings.proxy_name.clone(),
            image: self.settings.proxy_image.clone(),
            network: network.clone(),
            command: Some(commands::socat_forward(
                self.settings.proxy_listen_port,
                address,
                self.settings.service_port,
            )),
            publish: Some(PortForward {
                container_port: self.settings.proxy_listen_port,
                host_port: self.settings.service_port,
            }),
        };
        let proxy = self.fabric.create_unit(&request).await?;
        ledger.register(CleanupAction::DeleteProxy {
            name: self.settings.proxy_name.clone(),
        });
        self.fabric.start_unit(&proxy.id).await?;
        info!(
            forward_to = address,
            host_port = self.settings.service_port,
            "proxy started"
        );
        Ok(())
    }

    async fn join(&self, nodes: &[ComputeUnit], credentials: &Credentials) -> Result<()> {
        let (first, rest) = nodes
            .split_first()
            .ok_or_else(|| Error::InvalidSpec("cluster has no nodes".into()))?;
        let hostnames: Vec<String> = rest.iter().map(|n| n.hostname().to_string()).collect();
        info!(into = %first.hostname(), joining = %hostnames.join(", "), "joining nodes");

        let cmd = commands::server_add(credentials, &hostnames);
        self.retry
            .run("cluster join", || self.executor.exec(&first.id, &cmd))
            .await
            .map(|_| ())
            .inspect_err(|e| warn!(error = %e, "join did not succeed"))
    }
}
