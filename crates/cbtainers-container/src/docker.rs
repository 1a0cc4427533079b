//! FabricGateway and ExecBackend on a local Docker daemon

use crate::converter::{parse_image_tag, unit_container_config};
use crate::error::{ContainerError, Result};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{ContainerSummary, NetworkCreateRequest};
use cbtainers_core::fabric::STOP_GRACE;
use cbtainers_core::{
    ClusterNetwork, ComputeUnit, ExecBackend, ExecSession, FabricGateway, OutputChunk,
    OutputStream, UnitRequest, UnitState, matches_prefix,
};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DockerFabric {
    docker: Docker,
    stop_grace: Duration,
}

impl DockerFabric {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            stop_grace: STOP_GRACE,
        }
    }

    /// Connect with the platform defaults (`DOCKER_HOST` or the local socket)
    /// and make sure the daemon answers.
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        Ok(Self::new(docker))
    }

    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    async fn containers_matching(&self, prefix: &str) -> Result<Vec<ContainerSummary>> {
        // the daemon treats the name filter as an unanchored regex; validated
        // prefixes hold no metacharacters beyond '.', and the prefix check
        // below narrows the wider match
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![prefix.to_string()]);

        #[allow(deprecated)]
        let options = bollard::container::ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        #[allow(deprecated)]
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter(|c| {
                c.names
                    .as_ref()
                    .is_some_and(|names| names.iter().any(|n| matches_prefix(n, prefix)))
            })
            .collect())
    }

    async fn stop_and_remove(&self, id: &str, name: &str, running: bool) -> Result<()> {
        if running {
            let options = bollard::query_parameters::StopContainerOptions {
                t: Some(self.stop_grace.as_secs() as i32),
                ..Default::default()
            };
            match self.docker.stop_container(id, Some(options)).await {
                Ok(()) => debug!(container = name, "stopped"),
                Err(e) => match ContainerError::from_docker(e, format!("container {}", name)) {
                    ContainerError::NotModified { .. } => {
                        debug!(container = name, "already stopped")
                    }
                    ContainerError::NotFound { .. } => return Ok(()),
                    other => return Err(other),
                },
            }
        }

        let options = bollard::query_parameters::RemoveContainerOptions {
            v: true,
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) => match ContainerError::from_docker(e, format!("container {}", name)) {
                ContainerError::NotFound { .. } => Ok(()),
                other => Err(other),
            },
        }
    }
}

fn summary_name(summary: &ContainerSummary) -> String {
    summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .cloned()
        .unwrap_or_default()
}

fn summary_running(summary: &ContainerSummary) -> bool {
    summary
        .status
        .as_deref()
        .is_some_and(|status| status.contains("Up"))
}

#[async_trait]
impl FabricGateway for DockerFabric {
    async fn list_by_prefix(&self, prefix: &str) -> cbtainers_core::Result<Vec<ComputeUnit>> {
        let containers = self.containers_matching(prefix).await?;
        Ok(containers
            .iter()
            .map(|c| ComputeUnit {
                id: c.id.clone().unwrap_or_default(),
                name: summary_name(c),
                address: None,
                state: if summary_running(c) {
                    UnitState::Started
                } else {
                    UnitState::Created
                },
            })
            .collect())
    }

    async fn delete_matching(&self, prefix: &str) -> cbtainers_core::Result<usize> {
        let containers = self.containers_matching(prefix).await?;
        let mut removed = 0;
        for container in &containers {
            let Some(id) = container.id.as_deref() else {
                continue;
            };
            let name = summary_name(container);
            info!(container = %name.trim_start_matches('/'), "removing container");
            self.stop_and_remove(id, &name, summary_running(container))
                .await?;
            removed += 1;
        }
        Ok(removed)
    }

    async fn create_network(&self, name: &str) -> cbtainers_core::Result<ClusterNetwork> {
        let request = NetworkCreateRequest {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            ..Default::default()
        };
        self.docker
            .create_network(request)
            .await
            .map_err(|e| ContainerError::from_docker(e, format!("network {}", name)))?;

        let network = self
            .docker
            .inspect_network(
                name,
                None::<bollard::query_parameters::InspectNetworkOptions>,
            )
            .await
            .map_err(|e| ContainerError::from_docker(e, format!("network {}", name)))?;

        Ok(ClusterNetwork {
            id: network.id.unwrap_or_default(),
            name: name.to_string(),
        })
    }

    async fn remove_network(&self, name: &str) -> cbtainers_core::Result<()> {
        self.docker
            .remove_network(name)
            .await
            .map_err(|e| ContainerError::from_docker(e, format!("network {}", name)))?;
        Ok(())
    }

    async fn pull_image(&self, reference: &str) -> cbtainers_core::Result<()> {
        let (image_name, tag) = parse_image_tag(reference);

        #[allow(deprecated)]
        let options = bollard::image::CreateImageOptions {
            from_image: image_name,
            tag,
            ..Default::default()
        };

        #[allow(deprecated)]
        let mut stream =
            self.docker
                .create_image(Some(options), None, None::<bollard::auth::DockerCredentials>);

        while let Some(info) = stream.next().await {
            match info {
                Ok(bollard::models::CreateImageInfo {
                    status: Some(status),
                    ..
                }) => debug!(image = reference, status = %status, "pull"),
                Ok(_) => {}
                Err(e) => {
                    return Err(ContainerError::ImagePull {
                        image: reference.to_string(),
                        message: e.to_string(),
                    }
                    .into());
                }
            }
        }

        info!(image = reference, "image ready");
        Ok(())
    }

    async fn create_unit(&self, request: &UnitRequest) -> cbtainers_core::Result<ComputeUnit> {
        let (config, options) = unit_container_config(request);

        #[allow(deprecated)]
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ContainerError::from_docker(e, format!("container {}", request.name)))?;

        for warning in &response.warnings {
            warn!(container = %request.name, warning = %warning, "docker warning");
        }

        Ok(ComputeUnit {
            id: response.id,
            name: format!("/{}", request.name),
            address: None,
            state: UnitState::Created,
        })
    }

    async fn start_unit(&self, id: &str) -> cbtainers_core::Result<()> {
        self.docker
            .start_container(id, None::<bollard::query_parameters::StartContainerOptions>)
            .await
            .map_err(|e| ContainerError::from_docker(e, format!("container {}", id)))?;
        Ok(())
    }

    async fn inspect_unit(&self, id: &str, network: &str) -> cbtainers_core::Result<ComputeUnit> {
        let inspect = self
            .docker
            .inspect_container(id, None::<bollard::query_parameters::InspectContainerOptions>)
            .await
            .map_err(|e| ContainerError::from_docker(e, format!("container {}", id)))?;

        let address = inspect
            .network_settings
            .as_ref()
            .and_then(|settings| settings.networks.as_ref())
            .and_then(|networks| networks.get(network))
            .and_then(|endpoint| endpoint.ip_address.clone())
            .filter(|ip| !ip.is_empty());

        Ok(ComputeUnit {
            id: inspect.id.unwrap_or_else(|| id.to_string()),
            name: inspect.name.unwrap_or_default(),
            address,
            state: UnitState::Inspected,
        })
    }
}

#[async_trait]
impl ExecBackend for DockerFabric {
    async fn start_exec(
        &self,
        unit_id: &str,
        argv: &[String],
    ) -> cbtainers_core::Result<ExecSession> {
        let exec_config = CreateExecOptions {
            cmd: Some(argv.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let message = self
            .docker
            .create_exec(unit_id, exec_config)
            .await
            .map_err(|e| ContainerError::from_docker(e, format!("container {}", unit_id)))?;

        let start_config = StartExecOptions {
            ..Default::default()
        };
        let output: OutputStream = match self
            .docker
            .start_exec(&message.id, Some(start_config))
            .await
            .map_err(ContainerError::from)?
        {
            StartExecResults::Attached { output, .. } => output
                .filter_map(|msg| async move {
                    match msg {
                        Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                            Some(Ok(OutputChunk::Stdout(message.to_vec())))
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            Some(Ok(OutputChunk::Stderr(message.to_vec())))
                        }
                        Ok(LogOutput::StdIn { .. }) => None,
                        Err(e) => Some(Err(cbtainers_core::Error::from(ContainerError::from(e)))),
                    }
                })
                .boxed(),
            StartExecResults::Detached => stream::empty().boxed(),
        };

        Ok(ExecSession {
            id: message.id,
            output,
        })
    }

    async fn exit_code(&self, exec_id: &str) -> cbtainers_core::Result<Option<i64>> {
        let code = settle_exit(EXIT_POLL_ATTEMPTS, EXIT_POLL_INTERVAL, || async {
            let inspect = self
                .docker
                .inspect_exec(exec_id)
                .await
                .map_err(|e| ContainerError::from_docker(e, format!("exec {}", exec_id)))?;
            Ok((inspect.running, inspect.exit_code))
        })
        .await?;
        Ok(code)
    }
}

const EXIT_POLL_ATTEMPTS: u32 = 10;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exit status of an exec whose output stream has ended.
///
/// The daemon may still report the exec as running for a moment after EOF;
/// poll `inspect` until it settles. `None` if it never does.
async fn settle_exit<F, Fut>(attempts: u32, interval: Duration, mut inspect: F) -> Result<Option<i64>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(Option<bool>, Option<i64>)>>,
{
    for attempt in 1..=attempts {
        let (running, exit_code) = inspect().await?;
        if running != Some(true) {
            return Ok(exit_code);
        }
        if attempt < attempts {
            debug!(attempt, "exec still running after output ended");
            tokio::time::sleep(interval).await;
        }
    }
    Ok(None)
}
