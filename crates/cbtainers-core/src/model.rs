//! Data model shared by the orchestrator and the fabric adapters

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE: &str = "couchbase/server:7.1.1";
pub const DEFAULT_SIZE: usize = 3;
pub const DEFAULT_PREFIX: &str = "cb-node";
pub const DEFAULT_USERNAME: &str = "Administrator";
pub const DEFAULT_PASSWORD: &str = "password";

/// Administrator credential pair used for every admin command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Immutable description of the cluster to provision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Server image reference, e.g. `couchbase/server:7.1.1`
    pub image: String,
    /// Number of server nodes
    pub size: usize,
    /// Namespace for every resource the run creates
    pub prefix: String,
    pub credentials: Credentials,
    /// Only remove resources left over from a previous run
    #[serde(default)]
    pub delete_only: bool,
}

impl ClusterSpec {
    pub fn validate(&self) -> Result<()> {
        if self.prefix.trim().is_empty() {
            return Err(Error::InvalidSpec("prefix must not be empty".into()));
        }
        if self.prefix.contains('/') {
            return Err(Error::InvalidSpec(format!(
                "prefix '{}' must not contain '/'",
                self.prefix
            )));
        }
        if !valid_prefix(&self.prefix) {
            return Err(Error::InvalidSpec(format!(
                "prefix '{}' must start with a letter or digit and only contain letters, digits, '-', '_' and '.'",
                self.prefix
            )));
        }
        if self.delete_only {
            return Ok(());
        }
        if self.size == 0 {
            return Err(Error::InvalidSpec("node count must be at least 1".into()));
        }
        if self.image.trim().is_empty() {
            return Err(Error::InvalidSpec("image must not be empty".into()));
        }
        Ok(())
    }

    /// [`validate`](Self::validate), and keep the prefix and the proxy name
    /// from matching each other so prefix cleanup never takes the proxy.
    pub fn validate_with_proxy(&self, proxy_name: &str) -> Result<()> {
        self.validate()?;
        if proxy_name.starts_with(&self.prefix) || self.prefix.starts_with(proxy_name) {
            return Err(Error::InvalidSpec(format!(
                "prefix '{}' overlaps the proxy name '{}'",
                self.prefix, proxy_name
            )));
        }
        Ok(())
    }

    pub fn names(&self) -> ClusterNames {
        ClusterNames::derive(&self.prefix)
    }
}

/// Resource names derived once from the prefix at the start of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNames {
    pub prefix: String,
    pub network: String,
    pub cluster: String,
}

impl ClusterNames {
    pub fn derive(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            network: format!("{}-network", prefix),
            cluster: format!("{}-cluster", prefix),
        }
    }

    /// Name of the node at `index`: `<prefix>-<index>.docker`
    pub fn node(&self, index: usize) -> String {
        format!("{}-{}.docker", self.prefix, index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Created,
    Started,
    Inspected,
}

/// A single running node, identified by its fabric-assigned id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeUnit {
    pub id: String,
    /// Fabric-side name; Docker reports it with a leading `/`
    pub name: String,
    /// Address on the cluster network, known once the unit has been inspected
    pub address: Option<String>,
    pub state: UnitState,
}

impl ComputeUnit {
    /// Name as resolvable from other units on the same network
    pub fn hostname(&self) -> &str {
        self.name.trim_start_matches('/')
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNetwork {
    pub id: String,
    pub name: String,
}

/// Publish a unit-side port on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForward {
    pub container_port: u16,
    pub host_port: u16,
}

/// Everything the fabric needs to create one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRequest {
    pub name: String,
    pub image: String,
    pub network: ClusterNetwork,
    pub command: Option<Vec<String>>,
    pub publish: Option<PortForward>,
}

impl UnitRequest {
    pub fn node(name: impl Into<String>, image: impl Into<String>, network: &ClusterNetwork) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            network: network.clone(),
            command: None,
            publish: None,
        }
    }
}

/// Container-name characters only, so the prefix is also a literal
/// pattern for the fabric's name filter
fn valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Does a fabric-side unit name belong to `prefix`?
pub fn matches_prefix(name: &str, prefix: &str) -> bool {
    name.strip_prefix('/')
        .is_some_and(|rest| rest.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ClusterSpec {
        ClusterSpec {
            image: DEFAULT_IMAGE.into(),
            size: 3,
            prefix: "cb-test".into(),
            credentials: Credentials::new("Administrator", "Password"),
            delete_only: false,
        }
    }

    #[test]
    fn test_derived_names() {
        let names = spec().names();
        assert_eq!(names.network, "cb-test-network");
        assert_eq!(names.cluster, "cb-test-cluster");
        assert_eq!(names.node(0), "cb-test-0.docker");
        assert_eq!(names.node(2), "cb-test-2.docker");
    }

    #[test]
    fn test_validate_accepts_reference_spec() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let spec = ClusterSpec {
            prefix: "  ".into(),
            ..spec()
        };
        assert!(matches!(spec.validate(), Err(Error::InvalidSpec(_))));
    }

    #[test]
    fn test_validate_rejects_filter_metacharacters() {
        for prefix in ["cb[1", "c++", "cb$", "-cb", "cb test"] {
            let spec = ClusterSpec {
                prefix: prefix.into(),
                ..spec()
            };
            assert!(
                matches!(spec.validate(), Err(Error::InvalidSpec(_))),
                "{prefix} accepted"
            );
        }
    }

    #[test]
    fn test_validate_accepts_name_characters() {
        let spec = ClusterSpec {
            prefix: "Dev_1.cb-x".into(),
            ..spec()
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_default_prefix_is_clear_of_proxy_name() {
        let spec = ClusterSpec {
            prefix: DEFAULT_PREFIX.into(),
            ..spec()
        };
        assert!(spec.validate_with_proxy("cb-server-proxy").is_ok());
    }

    #[test]
    fn test_prefix_overlapping_proxy_name_is_rejected() {
        for prefix in ["cb", "cb-server", "cb-server-proxy", "cb-server-proxy-2"] {
            let spec = ClusterSpec {
                prefix: prefix.into(),
                delete_only: true,
                ..spec()
            };
            assert!(
                matches!(
                    spec.validate_with_proxy("cb-server-proxy"),
                    Err(Error::InvalidSpec(_))
                ),
                "{prefix} accepted"
            );
        }
    }

    #[test]
    fn test_validate_rejects_zero_nodes() {
        let spec = ClusterSpec { size: 0, ..spec() };
        assert!(matches!(spec.validate(), Err(Error::InvalidSpec(_))));
    }

    #[test]
    fn test_delete_only_ignores_size() {
        let spec = ClusterSpec {
            size: 0,
            delete_only: true,
            ..spec()
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_matches_prefix_requires_leading_slash() {
        assert!(matches_prefix("/cb-test-0.docker", "cb-test"));
        assert!(!matches_prefix("cb-test-0.docker", "cb-test"));
        assert!(!matches_prefix("/other-0.docker", "cb-test"));
    }

    #[test]
    fn test_hostname_strips_slash() {
        let unit = ComputeUnit {
            id: "abc".into(),
            name: "/cb-test-1.docker".into(),
            address: None,
            state: UnitState::Created,
        };
        assert_eq!(unit.hostname(), "cb-test-1.docker");
    }
}
