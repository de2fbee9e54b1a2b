//! Effective configuration for `v1` domain resources.
//!
//! Layering order for servers: hard defaults, domain spec, cluster override
//! (clustered servers only), server override, then the start policy.

use tracing::{debug, error};

use crate::effective::{default_image_pull_policy, ClusterConfig, ServerConfig, DEFAULT_REPLICAS};
use crate::error::Result;
use crate::model::{ClusterStartup, DomainSpec, ServerStartup};
use crate::startup::StartupControl;

use super::policy::{clustered_start_policy, non_clustered_start_policy};

/// Effective configuration of a server outside any cluster.
///
/// # Errors
///
/// Fails with an illegal startup control error.
pub fn compute_effective_server_config(
    spec: &DomainSpec,
    server_name: &str,
) -> Result<ServerConfig> {
    let control = startup_control(spec)?;
    let server_startup = spec.server_startup(server_name);

    let mut config = ServerConfig::with_defaults(server_name);
    apply_domain_spec(&mut config, spec);
    apply_server_startup(&mut config, server_startup);
    config.start_policy = non_clustered_start_policy(
        control,
        spec.is_admin_server(server_name),
        server_startup.is_some(),
    );

    debug!(
        server = server_name,
        start_policy = %config.start_policy,
        "Computed effective server configuration"
    );
    Ok(config)
}

/// Effective configuration of a server inside `cluster_name`.
///
/// # Errors
///
/// Fails with an illegal startup control error.
pub fn compute_effective_clustered_server_config(
    spec: &DomainSpec,
    cluster_name: &str,
    server_name: &str,
) -> Result<ServerConfig> {
    let control = startup_control(spec)?;
    let cluster_startup = spec.cluster_startup(cluster_name);
    let server_startup = spec.server_startup(server_name);

    let mut config = ServerConfig::with_defaults(server_name);
    config.cluster_name = Some(cluster_name.to_string());
    apply_domain_spec(&mut config, spec);
    apply_cluster_startup(&mut config, cluster_startup);
    apply_server_startup(&mut config, server_startup);
    config.start_policy = clustered_start_policy(
        control,
        spec.is_admin_server(server_name),
        cluster_startup.is_some(),
        server_startup.is_some(),
    );

    debug!(
        cluster = cluster_name,
        server = server_name,
        start_policy = %config.start_policy,
        "Computed effective clustered server configuration"
    );
    Ok(config)
}

/// Effective configuration of a cluster. Replicas come from the cluster
/// override, else the domain spec, else the default; the bounds equal the
/// resolved count.
///
/// # Errors
///
/// Fails with an illegal startup control error.
pub fn compute_effective_cluster_config(
    spec: &DomainSpec,
    cluster_name: &str,
) -> Result<ClusterConfig> {
    startup_control(spec)?;
    let replicas = spec
        .cluster_startup(cluster_name)
        .and_then(|c| c.replicas)
        .or(spec.replicas)
        .unwrap_or(DEFAULT_REPLICAS);

    debug!(cluster = cluster_name, replicas, "Computed effective cluster configuration");
    Ok(ClusterConfig::new(cluster_name, replicas))
}

/// Write a cluster's replica count back into the spec.
///
/// The cluster override receives the count only if it exists and already
/// sets replicas; otherwise the domain-level count is written.
pub fn update_desired_replicas(spec: &mut DomainSpec, cluster: &ClusterConfig) {
    match spec.cluster_startup_mut(&cluster.cluster_name) {
        Some(ClusterStartup {
            replicas: Some(replicas),
            ..
        }) => *replicas = cluster.replicas,
        _ => spec.replicas = Some(cluster.replicas),
    }
    debug!(
        cluster = %cluster.cluster_name,
        replicas = cluster.replicas,
        "Updated desired replicas"
    );
}

fn startup_control(spec: &DomainSpec) -> Result<StartupControl> {
    spec.startup_control().inspect_err(|e| {
        error!(
            domain = spec.domain_uid.as_deref().unwrap_or_default(),
            error = %e,
            "Cannot compute effective configuration"
        );
    })
}

fn apply_domain_spec(config: &mut ServerConfig, spec: &DomainSpec) {
    if let Some(image) = &spec.image {
        config.image.clone_from(image);
    }
    config.image_pull_policy = match &spec.image_pull_policy {
        Some(policy) => policy.clone(),
        None => default_image_pull_policy(&config.image).to_string(),
    };
}

fn apply_cluster_startup(config: &mut ServerConfig, cluster: Option<&ClusterStartup>) {
    let Some(cluster) = cluster else {
        return;
    };
    if let Some(state) = &cluster.desired_state {
        config.desired_state.clone_from(state);
    }
    config.env = cluster.env.clone().unwrap_or_default();
}

fn apply_server_startup(config: &mut ServerConfig, server: Option<&ServerStartup>) {
    let Some(server) = server else {
        return;
    };
    if let Some(port) = server.node_port {
        config.node_port = port;
    }
    if let Some(state) = &server.desired_state {
        config.desired_state.clone_from(state);
    }
    config.env = server.env.clone().unwrap_or_default();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::effective::DEFAULT_IMAGE;
    use crate::model::EnvVar;
    use crate::startup::StartPolicy;

    fn spec(control: &str) -> DomainSpec {
        DomainSpec {
            as_name: Some("admin-server".to_string()),
            startup_control: Some(control.to_string()),
            ..DomainSpec::default()
        }
    }

    #[test]
    fn test_defaults_when_spec_is_empty() {
        let config = compute_effective_server_config(&DomainSpec::default(), "ms1").unwrap();

        assert_eq!(config.image, DEFAULT_IMAGE);
        assert_eq!(config.image_pull_policy, "IfNotPresent");
        assert_eq!(config.node_port, 0);
        assert_eq!(config.desired_state, "RUNNING");
        assert_eq!(config.start_policy, StartPolicy::Never);
    }

    #[test]
    fn test_latest_image_pulls_always() {
        let spec = DomainSpec {
            image: Some("repo/server:latest".to_string()),
            ..DomainSpec::default()
        };
        let config = compute_effective_server_config(&spec, "ms1").unwrap();
        assert_eq!(config.image_pull_policy, "Always");
    }

    #[test]
    fn test_explicit_pull_policy_wins() {
        let spec = DomainSpec {
            image: Some("repo/server:latest".to_string()),
            image_pull_policy: Some("Never".to_string()),
            ..DomainSpec::default()
        };
        let config = compute_effective_server_config(&spec, "ms1").unwrap();
        assert_eq!(config.image_pull_policy, "Never");
    }

    #[test]
    fn test_server_override_applies() {
        let mut spec = spec("SPECIFIED");
        spec.server_startup.push(ServerStartup {
            server_name: "ms1".to_string(),
            node_port: Some(30801),
            desired_state: Some("ADMIN".to_string()),
            env: Some(vec![EnvVar::new("A", "1")]),
        });

        let config = compute_effective_server_config(&spec, "ms1").unwrap();

        assert_eq!(config.node_port, 30801);
        assert_eq!(config.desired_state, "ADMIN");
        assert_eq!(config.env, vec![EnvVar::new("A", "1")]);
        assert_eq!(config.start_policy, StartPolicy::Always);
    }

    #[test]
    fn test_server_override_replaces_cluster_env() {
        let mut spec = spec("AUTO");
        spec.cluster_startup.push(ClusterStartup {
            cluster_name: "c1".to_string(),
            replicas: None,
            desired_state: Some("STANDBY".to_string()),
            env: Some(vec![EnvVar::new("FROM_CLUSTER", "1")]),
        });
        spec.server_startup.push(ServerStartup::new("ms1"));

        let config = compute_effective_clustered_server_config(&spec, "c1", "ms1").unwrap();

        assert_eq!(config.cluster_name.as_deref(), Some("c1"));
        assert_eq!(config.desired_state, "STANDBY");
        assert!(config.env.is_empty());
        assert_eq!(config.start_policy, StartPolicy::Always);
    }

    #[test]
    fn test_cluster_override_env_applies() {
        let mut spec = spec("AUTO");
        spec.cluster_startup.push(ClusterStartup {
            cluster_name: "c1".to_string(),
            env: Some(vec![EnvVar::new("FROM_CLUSTER", "1")]),
            ..ClusterStartup::default()
        });

        let config = compute_effective_clustered_server_config(&spec, "c1", "ms2").unwrap();

        assert_eq!(config.env, vec![EnvVar::new("FROM_CLUSTER", "1")]);
        assert_eq!(config.start_policy, StartPolicy::IfNeeded);
    }

    #[test]
    fn test_cluster_replicas_resolution() {
        let mut spec = spec("AUTO");
        assert_eq!(compute_effective_cluster_config(&spec, "c1").unwrap().replicas, 0);

        spec.replicas = Some(2);
        assert_eq!(compute_effective_cluster_config(&spec, "c1").unwrap().replicas, 2);

        spec.cluster_startup.push(ClusterStartup {
            cluster_name: "c1".to_string(),
            replicas: Some(5),
            ..ClusterStartup::default()
        });
        let config = compute_effective_cluster_config(&spec, "c1").unwrap();
        assert_eq!((config.replicas, config.min_replicas, config.max_replicas), (5, 5, 5));
        assert_eq!(compute_effective_cluster_config(&spec, "c2").unwrap().replicas, 2);
    }

    #[test]
    fn test_cluster_override_without_replicas_writes_domain_level() {
        let mut spec = spec("AUTO");
        spec.replicas = Some(1);
        spec.cluster_startup.push(ClusterStartup::new("c1"));

        update_desired_replicas(&mut spec, &ClusterConfig::new("c1", 3));

        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.cluster_startup("c1").and_then(|c| c.replicas), None);
    }

    #[test]
    fn test_illegal_control_fails_every_builder() {
        let spec = spec("SOMETIMES");
        assert!(compute_effective_server_config(&spec, "ms1").is_err());
        assert!(compute_effective_clustered_server_config(&spec, "c1", "ms1").is_err());
        assert!(compute_effective_cluster_config(&spec, "c1").is_err());
    }
}
