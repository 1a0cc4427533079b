//! Lifecycle orchestration for throwaway multi-node Couchbase Server clusters
//!
//! The crate sequences calls against two capabilities, [`FabricGateway`] for
//! units, networks and images, and [`ExecBackend`] for running commands
//! inside units. Concrete fabrics live in other crates.

pub mod commands;
pub mod error;
pub mod exec;
pub mod fabric;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod readiness;
pub mod retry;

pub use error::{Error, Result};
pub use exec::{CapturedOutput, ExecBackend, ExecSession, OutputChunk, OutputStream, RemoteExecutor};
pub use fabric::{FabricGateway, remove_network_if_present};
pub use ledger::{CleanupAction, CleanupLedger};
pub use model::*;
pub use orchestrator::{
    ClusterResult, Orchestrator, OrchestratorSettings, ProvisionError, Step,
};
pub use readiness::{HttpProbe, ReadinessProbe, wait_until_ready};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
