//! HTTP readiness gating for the server's admin UI

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

pub const SERVICE_PORT: u16 = 8091;
pub const HEALTH_PATH: &str = "/ui/index.html";

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Single check; `Ok` only when the service answers as ready
    async fn probe(&self, host: &str) -> Result<()>;
}

/// `GET http://<host>:<port><path>`, ready iff the status is exactly 200
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    port: u16,
    path: String,
}

impl HttpProbe {
    pub fn new(port: u16, path: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            port,
            path: path.into(),
        })
    }

    pub fn url(&self, host: &str) -> String {
        format!("http://{}:{}{}", host, self.port, self.path)
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn probe(&self, host: &str) -> Result<()> {
        let url = self.url(host);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::NotReady {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            Ok(())
        } else {
            Err(Error::NotReady {
                url,
                reason: format!("status {}", status),
            })
        }
    }
}

/// Poll `host` with the retry cadence until it reports ready
pub async fn wait_until_ready(
    probe: &dyn ReadinessProbe,
    retry: &RetryPolicy,
    host: &str,
) -> Result<()> {
    info!(host, "waiting for the cluster to answer");
    retry.run("readiness probe", || probe.probe(host)).await?;
    info!(host, "cluster is answering");
    Ok(())
}
