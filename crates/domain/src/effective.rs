//! Effective server and cluster configuration.
//!
//! These are read-only snapshots computed from a [`DomainSpec`](crate::DomainSpec)
//! on every pass. They are never cached.

use serde::{Deserialize, Serialize};

use crate::model::EnvVar;
use crate::startup::StartPolicy;

/// Default node port (none).
pub const DEFAULT_NODE_PORT: u16 = 0;
/// Default desired server state.
pub const DEFAULT_DESIRED_STATE: &str = "RUNNING";
/// Default server image.
pub const DEFAULT_IMAGE: &str = "store/oracle/weblogic:12.2.1.3";
/// Default shutdown policy.
pub const DEFAULT_SHUTDOWN_POLICY: &str = "FORCED_SHUTDOWN";
/// Default graceful shutdown timeout in seconds.
pub const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT: u32 = 0;
/// Default for ignoring sessions during graceful shutdown.
pub const DEFAULT_GRACEFUL_SHUTDOWN_IGNORE_SESSIONS: bool = false;
/// Default for waiting on sessions during graceful shutdown.
pub const DEFAULT_GRACEFUL_SHUTDOWN_WAIT_FOR_SESSIONS: bool = false;
/// Default cluster replica count.
pub const DEFAULT_REPLICAS: u32 = 0;

/// Image pull policy for images tagged `:latest`.
pub const ALWAYS_IMAGE_PULL_POLICY: &str = "Always";
/// Image pull policy for every other image.
pub const IF_NOT_PRESENT_IMAGE_PULL_POLICY: &str = "IfNotPresent";

/// Derive the pull policy for an image that has none configured.
pub fn default_image_pull_policy(image: &str) -> &'static str {
    if image.ends_with(":latest") {
        ALWAYS_IMAGE_PULL_POLICY
    } else {
        IF_NOT_PRESENT_IMAGE_PULL_POLICY
    }
}

/// Effective configuration of one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub server_name: String,
    /// Owning cluster, `None` for non-clustered servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    pub start_policy: StartPolicy,
    pub image: String,
    pub image_pull_policy: String,
    pub node_port: u16,
    pub desired_state: String,
    pub env: Vec<EnvVar>,
    pub shutdown_policy: String,
    pub graceful_shutdown_timeout: u32,
    pub graceful_shutdown_ignore_sessions: bool,
    pub graceful_shutdown_wait_for_sessions: bool,
}

impl ServerConfig {
    /// A configuration holding only the hard defaults.
    ///
    /// The start policy starts out as `Never`; builders always overwrite it.
    pub fn with_defaults(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            cluster_name: None,
            start_policy: StartPolicy::Never,
            image: DEFAULT_IMAGE.to_string(),
            image_pull_policy: default_image_pull_policy(DEFAULT_IMAGE).to_string(),
            node_port: DEFAULT_NODE_PORT,
            desired_state: DEFAULT_DESIRED_STATE.to_string(),
            env: Vec::new(),
            shutdown_policy: DEFAULT_SHUTDOWN_POLICY.to_string(),
            graceful_shutdown_timeout: DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT,
            graceful_shutdown_ignore_sessions: DEFAULT_GRACEFUL_SHUTDOWN_IGNORE_SESSIONS,
            graceful_shutdown_wait_for_sessions: DEFAULT_GRACEFUL_SHUTDOWN_WAIT_FOR_SESSIONS,
        }
    }
}

/// Effective configuration of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub replicas: u32,
    pub min_replicas: u32,
    pub max_replicas: u32,
}

impl ClusterConfig {
    /// A cluster configuration pinned to `replicas`.
    pub fn new(cluster_name: impl Into<String>, replicas: u32) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            replicas,
            min_replicas: replicas,
            max_replicas: replicas,
        }
    }

    /// Replace the replica count, keeping the bounds pinned to it.
    #[must_use]
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self.min_replicas = replicas;
        self.max_replicas = replicas;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_policy_from_tag() {
        assert_eq!(default_image_pull_policy("repo/app:latest"), "Always");
        assert_eq!(default_image_pull_policy("repo/app:1.0"), "IfNotPresent");
        assert_eq!(default_image_pull_policy("repo/app"), "IfNotPresent");
        assert_eq!(default_image_pull_policy("repo/latest"), "IfNotPresent");
    }

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::with_defaults("ms1");
        assert_eq!(config.node_port, 0);
        assert_eq!(config.desired_state, "RUNNING");
        assert_eq!(config.image, DEFAULT_IMAGE);
        assert_eq!(config.image_pull_policy, "IfNotPresent");
        assert_eq!(config.shutdown_policy, "FORCED_SHUTDOWN");
        assert!(config.env.is_empty());
        assert_eq!(config.cluster_name, None);
    }

    #[test]
    fn test_cluster_bounds_follow_replicas() {
        let config = ClusterConfig::new("c1", 2).with_replicas(5);
        assert_eq!((config.min_replicas, config.max_replicas), (5, 5));
    }
}
