//! Docker implementation of the cbtainers fabric and exec capabilities

pub mod converter;
pub mod docker;
pub mod error;

pub use converter::{parse_image_tag, unit_container_config};
pub use docker::DockerFabric;
pub use error::{ContainerError, Result};
