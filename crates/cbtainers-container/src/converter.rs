//! UnitRequest to Docker API parameters

#![allow(deprecated)]

use bollard::container::{Config, CreateContainerOptions, NetworkingConfig};
use bollard::models::{EndpointSettings, HostConfig, PortBinding};
use cbtainers_core::UnitRequest;
use std::collections::HashMap;

pub const LABEL_NETWORK: &str = "cbtainers.network";
pub const LABEL_UNIT: &str = "cbtainers.unit";

/// Split an image reference into repository and tag.
///
/// `couchbase/server` -> (`couchbase/server`, `latest`),
/// `localhost:5000/server:7.1.1` -> (`localhost:5000/server`, `7.1.1`).
/// Digest references are passed through whole with an empty tag.
pub fn parse_image_tag(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

pub fn unit_container_config(
    request: &UnitRequest,
) -> (Config<String>, CreateContainerOptions<String>) {
    let mut port_bindings = HashMap::new();
    let mut exposed_ports = HashMap::new();
    if let Some(forward) = request.publish {
        let container_port = format!("{}/tcp", forward.container_port);
        exposed_ports.insert(container_port.clone(), HashMap::new());
        port_bindings.insert(
            container_port,
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(forward.host_port.to_string()),
            }]),
        );
    }

    let host_config = Some(HostConfig {
        port_bindings: Some(port_bindings),
        network_mode: Some(request.network.name.clone()),
        ..Default::default()
    });

    let mut labels = HashMap::new();
    labels.insert(LABEL_NETWORK.to_string(), request.network.name.clone());
    labels.insert(LABEL_UNIT.to_string(), request.name.clone());

    // the unit name doubles as its DNS name on the cluster network
    let mut endpoints = HashMap::new();
    endpoints.insert(
        request.network.name.clone(),
        EndpointSettings {
            aliases: Some(vec![request.name.clone()]),
            ..Default::default()
        },
    );

    let config = Config {
        image: Some(request.image.clone()),
        hostname: Some(request.name.clone()),
        exposed_ports: Some(exposed_ports),
        host_config,
        labels: Some(labels),
        cmd: request.command.clone(),
        networking_config: Some(NetworkingConfig {
            endpoints_config: endpoints,
        }),
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: request.name.clone(),
        platform: None,
    };

    (config, options)
}
