use cbtainers_config::Defaults;
use cbtainers_core::{
    ClusterSpec, Credentials, DEFAULT_IMAGE, DEFAULT_PASSWORD, DEFAULT_PREFIX, DEFAULT_SIZE,
    DEFAULT_USERNAME, OrchestratorSettings,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cbtainers", version)]
#[command(
    about = "Spin up a throwaway multi-node Couchbase Server cluster on Docker",
    long_about = None
)]
pub struct Cli {
    /// Only remove the units and network of an earlier run with this prefix
    #[arg(long, conflicts_with = "teardown")]
    pub delete: bool,

    /// Remove everything a run with this prefix may have created, proxy included
    #[arg(long)]
    pub teardown: bool,

    /// Server image to run on every node
    #[arg(long, env = "CBTAINERS_IMAGE")]
    pub image: Option<String>,

    /// Number of nodes in the cluster
    #[arg(short = 'n', long, env = "CBTAINERS_NUM")]
    pub num: Option<usize>,

    /// Cluster administrator username
    #[arg(long, env = "CBTAINERS_USERNAME")]
    pub username: Option<String>,

    /// Cluster administrator password
    #[arg(long, env = "CBTAINERS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Prefix for node, network and cluster names
    #[arg(short, long, env = "CBTAINERS_PREFIX")]
    pub prefix: Option<String>,

    /// Host the readiness probe connects to
    #[arg(long, env = "CBTAINERS_PROBE_HOST")]
    pub probe_host: Option<String>,

    /// Attempts for readiness and each cluster admin command
    #[arg(long, env = "CBTAINERS_RETRY_ATTEMPTS")]
    pub retry_attempts: Option<u32>,

    /// Seconds between attempts
    #[arg(long, env = "CBTAINERS_RETRY_DELAY")]
    pub retry_delay: Option<u64>,

    /// Print the provisioned cluster as JSON
    #[arg(long)]
    pub json: bool,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long)]
    pub verbose: bool,

    /// Defaults file instead of the discovered one
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn cluster_spec(&self, defaults: &Defaults) -> ClusterSpec {
        ClusterSpec {
            image: layered(&self.image, &defaults.image, DEFAULT_IMAGE),
            size: self.num.or(defaults.num).unwrap_or(DEFAULT_SIZE),
            prefix: layered(&self.prefix, &defaults.prefix, DEFAULT_PREFIX),
            credentials: Credentials::new(
                layered(&self.username, &defaults.username, DEFAULT_USERNAME),
                layered(&self.password, &defaults.password, DEFAULT_PASSWORD),
            ),
            delete_only: self.delete,
        }
    }

    pub fn settings(&self, defaults: &Defaults) -> OrchestratorSettings {
        let base = OrchestratorSettings::default();
        OrchestratorSettings {
            retry_attempts: self
                .retry_attempts
                .or(defaults.retry_attempts)
                .unwrap_or(base.retry_attempts),
            retry_delay: self
                .retry_delay
                .or(defaults.retry_delay_secs)
                .map(Duration::from_secs)
                .unwrap_or(base.retry_delay),
            probe_host: layered(&self.probe_host, &defaults.probe_host, &base.probe_host),
            ..base
        }
    }
}

fn layered(flag: &Option<String>, file: &Option<String>, fallback: &str) -> String {
    flag.as_deref()
        .or(file.as_deref())
        .unwrap_or(fallback)
        .to_string()
}
