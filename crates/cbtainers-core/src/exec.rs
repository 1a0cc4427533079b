//! Remote command execution inside a running unit
//!
//! The attached output stream is unbuffered on the fabric side, so it is
//! drained by a spawned task while the caller waits on a single-slot
//! completion channel. Draining and waiting in sequence would stall as soon
//! as a command writes more than one pipe buffer of output.

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One frame of demultiplexed command output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

pub type OutputStream = BoxStream<'static, Result<OutputChunk>>;

/// A started execution with its attached output
pub struct ExecSession {
    pub id: String,
    pub output: OutputStream,
}

/// Fabric primitives needed to run a command in a unit
#[async_trait]
pub trait ExecBackend: Send + Sync {
    /// Create an execution in `unit_id` and attach to its stdout/stderr
    async fn start_exec(&self, unit_id: &str, argv: &[String]) -> Result<ExecSession>;

    /// Exit status of a finished execution, `None` if the fabric has none yet
    async fn exit_code(&self, exec_id: &str) -> Result<Option<i64>>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Clone)]
pub struct RemoteExecutor {
    backend: Arc<dyn ExecBackend>,
    cancel: CancellationToken,
}

impl RemoteExecutor {
    pub fn new(backend: Arc<dyn ExecBackend>) -> Self {
        Self {
            backend,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `argv` in `unit_id` and return its captured stdout.
    ///
    /// A non-zero exit becomes [`Error::ExecFailed`] carrying the captured
    /// stderr. If the cancellation token fires before the output has been
    /// fully drained, returns [`Error::Cancelled`] and leaves the drain task
    /// to finish on its own.
    pub async fn exec(&self, unit_id: &str, argv: &[String]) -> Result<String> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!(unit = unit_id, command = %argv.join(" "), "exec");
        let ExecSession { id, output } = self.backend.start_exec(unit_id, argv).await?;

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = done_tx.send(drain(output).await);
        });

        let captured = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            drained = done_rx => drained
                .map_err(|_| Error::Fabric(format!("output drain for exec {} was dropped", id)))??,
        };

        debug!(unit = unit_id, stdout = %captured.stdout, stderr = %captured.stderr, "exec output");

        let exit_code = self
            .backend
            .exit_code(&id)
            .await?
            .ok_or_else(|| Error::Fabric(format!("exec {} reported no exit status", id)))?;

        if exit_code != 0 {
            return Err(Error::ExecFailed {
                argv: argv.to_vec(),
                exit_code,
                stderr: captured.stderr,
            });
        }

        Ok(captured.stdout)
    }
}

async fn drain(mut output: OutputStream) -> Result<CapturedOutput> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    while let Some(chunk) = output.next().await {
        match chunk? {
            OutputChunk::Stdout(bytes) => stdout.extend_from_slice(&bytes),
            OutputChunk::Stderr(bytes) => stderr.extend_from_slice(&bytes),
        }
    }

    Ok(CapturedOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}
