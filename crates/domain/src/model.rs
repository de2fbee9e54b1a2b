//! Domain resource model.
//!
//! Field names follow the resource's camelCase wire format. Every field the
//! user may omit is optional here; defaults are applied by the builders, not
//! at deserialization time.

use std::path::Path;

use domop_core::Error as LoadError;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::startup::StartupControl;

/// Default `apiVersion` of a domain resource.
pub const DOMAIN_API_VERSION: &str = "domop.io/v1";
/// Kind of a domain resource.
pub const DOMAIN_KIND: &str = "Domain";

/// A domain custom resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: DomainMeta,
    #[serde(default)]
    pub spec: DomainSpec,
}

fn default_api_version() -> String {
    DOMAIN_API_VERSION.to_string()
}

fn default_kind() -> String {
    DOMAIN_KIND.to_string()
}

impl Domain {
    /// Create a domain with the given name and spec.
    pub fn new(name: impl Into<String>, spec: DomainSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: DomainMeta {
                name: Some(name.into()),
                namespace: None,
            },
            spec,
        }
    }

    /// Parse a domain from YAML.
    ///
    /// # Errors
    ///
    /// Returns a load error if the text is not a valid domain resource.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| LoadError::yaml_parse_failed(e.to_string()).into())
    }

    /// Parse a domain from JSON.
    ///
    /// # Errors
    ///
    /// Returns a load error if the text is not a valid domain resource.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| LoadError::json_parse_failed(e.to_string()).into())
    }

    /// Load a domain from a `.yaml`, `.yml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns a load error if the file cannot be read, has another
    /// extension, or does not parse.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LoadError::file_read_failed(path, e.to_string()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
            }
            .into()),
        }
    }
}

/// The subset of object metadata the builders care about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Desired state of a domain as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    /// Unique id of the domain.
    #[serde(default, rename = "domainUID", skip_serializing_if = "Option::is_none")]
    pub domain_uid: Option<String>,
    /// Name of the domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    /// Name of the admin server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
    /// Server image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Image pull policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    /// Replicas for clusters without their own replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    /// Raw startup control mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_control: Option<String>,
    /// Per-server overrides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_startup: Vec<ServerStartup>,
    /// Per-cluster overrides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_startup: Vec<ClusterStartup>,
}

impl DomainSpec {
    /// Parsed startup control. An absent value means [`StartupControl::Auto`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalStartupControl`](crate::Error::IllegalStartupControl)
    /// for values outside the known set.
    pub fn startup_control(&self) -> Result<StartupControl> {
        self.startup_control
            .as_deref()
            .map_or(Ok(StartupControl::default()), str::parse)
    }

    /// Whether `server_name` names the admin server.
    pub fn is_admin_server(&self, server_name: &str) -> bool {
        self.as_name.as_deref() == Some(server_name)
    }

    /// Override entry for a server.
    pub fn server_startup(&self, server_name: &str) -> Option<&ServerStartup> {
        self.server_startup
            .iter()
            .find(|s| s.server_name == server_name)
    }

    /// Override entry for a cluster.
    pub fn cluster_startup(&self, cluster_name: &str) -> Option<&ClusterStartup> {
        self.cluster_startup
            .iter()
            .find(|c| c.cluster_name == cluster_name)
    }

    /// Mutable override entry for a cluster.
    pub fn cluster_startup_mut(&mut self, cluster_name: &str) -> Option<&mut ClusterStartup> {
        self.cluster_startup
            .iter_mut()
            .find(|c| c.cluster_name == cluster_name)
    }
}

/// Override entry for one server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStartup {
    pub server_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
}

impl ServerStartup {
    /// Create an override entry with no fields set.
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            ..Self::default()
        }
    }
}

/// Override entry for one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStartup {
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
}

impl ClusterStartup {
    /// Create an override entry with no fields set.
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            ..Self::default()
        }
    }
}

/// A container environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl EnvVar {
    /// Create a variable with a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}
