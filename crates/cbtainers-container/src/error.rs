use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "cannot connect to Docker: {0}\n\nhint:\n  • check that the Docker daemon is running\n  • check that `docker ps` works for the current user"
    )]
    DockerConnectionFailed(String),

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{resource} already exists: {message}")]
    Conflict { resource: String, message: String },

    #[error("{resource} is already in the requested state")]
    NotModified { resource: String },

    #[error("failed to pull image '{image}': {message}")]
    ImagePull { image: String, message: String },

    #[error("Docker API error: {0}")]
    DockerApiError(String),
}

impl ContainerError {
    /// Classify a Docker error in the context of the resource it concerned
    pub fn from_docker(err: bollard::errors::Error, resource: impl Into<String>) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => ContainerError::NotFound {
                resource: resource.into(),
            },
            bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                message,
            } => ContainerError::Conflict {
                resource: resource.into(),
                message: message.clone(),
            },
            bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            } => ContainerError::NotModified {
                resource: resource.into(),
            },
            _ => err.into(),
        }
    }
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        let err_str = err.to_string();
        if err_str.contains("Connection refused") || err_str.contains("No such file or directory") {
            ContainerError::DockerConnectionFailed(err_str)
        } else {
            ContainerError::DockerApiError(err_str)
        }
    }
}

impl From<ContainerError> for cbtainers_core::Error {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::NotFound { resource } => cbtainers_core::Error::NotFound { resource },
            ContainerError::Conflict { resource, message } => {
                cbtainers_core::Error::Conflict { resource, message }
            }
            other => cbtainers_core::Error::Fabric(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
