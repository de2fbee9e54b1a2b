//! Effective-configuration builders, selected by schema version.
//!
//! Builders are stateless functions. Callers pick the set matching the
//! resource's `apiVersion` through [`SchemaVersion`]; the free functions in
//! this module do that selection for a whole [`Domain`].

pub mod policy;
pub mod v1;

use crate::effective::{ClusterConfig, ServerConfig};
use crate::error::{Error, Result};
use crate::model::{Domain, DomainSpec};

/// Schema version of a domain resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    V1,
}

impl SchemaVersion {
    /// Map a resource `apiVersion` (`group/version` or bare `version`) to a
    /// schema version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedApiVersion`] for unknown versions.
    pub fn from_api_version(api_version: &str) -> Result<Self> {
        let version = api_version
            .rsplit_once('/')
            .map_or(api_version, |(_, version)| version);
        match version {
            "v1" => Ok(Self::V1),
            _ => Err(Error::unsupported_api_version(api_version)),
        }
    }

    /// Effective configuration of a non-clustered server.
    ///
    /// # Errors
    ///
    /// Fails with an illegal startup control error.
    pub fn compute_effective_server_config(
        self,
        spec: &DomainSpec,
        server_name: &str,
    ) -> Result<ServerConfig> {
        match self {
            Self::V1 => v1::compute_effective_server_config(spec, server_name),
        }
    }

    /// Effective configuration of a clustered server.
    ///
    /// # Errors
    ///
    /// Fails with an illegal startup control error.
    pub fn compute_effective_clustered_server_config(
        self,
        spec: &DomainSpec,
        cluster_name: &str,
        server_name: &str,
    ) -> Result<ServerConfig> {
        match self {
            Self::V1 => {
                v1::compute_effective_clustered_server_config(spec, cluster_name, server_name)
            }
        }
    }

    /// Effective configuration of a cluster.
    ///
    /// # Errors
    ///
    /// Fails with an illegal startup control error.
    pub fn compute_effective_cluster_config(
        self,
        spec: &DomainSpec,
        cluster_name: &str,
    ) -> Result<ClusterConfig> {
        match self {
            Self::V1 => v1::compute_effective_cluster_config(spec, cluster_name),
        }
    }

    /// Write a cluster's replica count back into the spec.
    pub fn update_desired_replicas(self, spec: &mut DomainSpec, cluster: &ClusterConfig) {
        match self {
            Self::V1 => v1::update_desired_replicas(spec, cluster),
        }
    }
}

/// Effective configuration of a non-clustered server of `domain`.
///
/// # Errors
///
/// Fails for an unsupported `apiVersion` or an illegal startup control.
pub fn compute_effective_server_config(domain: &Domain, server_name: &str) -> Result<ServerConfig> {
    SchemaVersion::from_api_version(&domain.api_version)?
        .compute_effective_server_config(&domain.spec, server_name)
}

/// Effective configuration of a server in `cluster_name` of `domain`.
///
/// # Errors
///
/// Fails for an unsupported `apiVersion` or an illegal startup control.
pub fn compute_effective_clustered_server_config(
    domain: &Domain,
    cluster_name: &str,
    server_name: &str,
) -> Result<ServerConfig> {
    SchemaVersion::from_api_version(&domain.api_version)?.compute_effective_clustered_server_config(
        &domain.spec,
        cluster_name,
        server_name,
    )
}

/// Effective configuration of `cluster_name` of `domain`.
///
/// # Errors
///
/// Fails for an unsupported `apiVersion` or an illegal startup control.
pub fn compute_effective_cluster_config(
    domain: &Domain,
    cluster_name: &str,
) -> Result<ClusterConfig> {
    SchemaVersion::from_api_version(&domain.api_version)?
        .compute_effective_cluster_config(&domain.spec, cluster_name)
}

/// Write a cluster's replica count back into `domain`.
///
/// # Errors
///
/// Fails for an unsupported `apiVersion`.
pub fn update_desired_replicas(domain: &mut Domain, cluster: &ClusterConfig) -> Result<()> {
    SchemaVersion::from_api_version(&domain.api_version)?
        .update_desired_replicas(&mut domain.spec, cluster);
    Ok(())
}
