use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{resource} already exists: {message}")]
    Conflict { resource: String, message: String },

    #[error(
        "command `{}` exited with status {exit_code}\nstderr: {stderr}",
        .argv.join(" ")
    )]
    ExecFailed {
        argv: Vec<String>,
        exit_code: i64,
        stderr: String,
    },

    #[error("{url} is not ready: {reason}")]
    NotReady { url: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("compute fabric error: {0}")]
    Fabric(String),

    #[error("unit '{unit}' has no address on network '{network}'")]
    MissingAddress { unit: String, network: String },

    #[error("invalid cluster spec: {0}")]
    InvalidSpec(String),

    #[error("teardown finished with {} failure(s): {}", .failures.len(), .failures.join("; "))]
    Teardown { failures: Vec<String> },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Error::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
