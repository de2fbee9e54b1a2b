//! Cluster API client boundary.
//!
//! The reconcile chains talk to the cluster only through [`ClusterClient`].
//! Bodies are untyped JSON so one client serves every resource kind; typed
//! models convert at the edges.

use std::fmt;

use async_trait::async_trait;
use domop_work::{CallError, CallResponse};
use serde_json::Value;
use thiserror::Error;

/// API group, version and plural name of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl ResourceKind {
    /// Create a resource kind.
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
        }
    }

    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Identity of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub kind: ResourceKind,
    /// `None` for cluster-scoped resources.
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceId {
    /// Identity of a cluster-scoped resource.
    pub fn cluster_scoped(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    /// Identity of a namespaced resource.
    pub fn namespaced(
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}/{}", self.kind.plural, namespace, self.name),
            None => write!(f, "{}/{}", self.kind.plural, self.name),
        }
    }
}

/// Failure reported by the cluster API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct ApiError {
    /// HTTP status; `None` when no response was received.
    pub status: Option<u16>,
    pub reason: String,
    pub body: Option<String>,
}

impl ApiError {
    /// An error response with the given status.
    pub fn status(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            reason: reason.into(),
            body: None,
        }
    }

    /// No response was received.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: reason.into(),
            body: None,
        }
    }

    /// Attach a response body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// 404 for `id`.
    pub fn not_found(id: &ResourceId) -> Self {
        Self::status(404, format!("{id} not found"))
    }

    /// 409 for `id`.
    pub fn conflict(id: &ResourceId, reason: impl fmt::Display) -> Self {
        Self::status(409, format!("conflict on {id}: {reason}"))
    }

    /// 401.
    pub fn unauthorized() -> Self {
        Self::status(401, "unauthorized")
    }

    /// 403.
    pub fn forbidden(id: &ResourceId) -> Self {
        Self::status(403, format!("access to {id} is forbidden"))
    }

    /// Whether this is a 404.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl From<ApiError> for CallError {
    fn from(error: ApiError) -> Self {
        let call = match error.status {
            Some(status) => Self::status(status, error.reason),
            None => Self::transport(error.reason),
        };
        match error.body {
            Some(body) => call.with_body(body),
            None => call,
        }
    }
}

/// Result of a cluster API call.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Convert a client result into a call response.
pub fn into_call_response<T>(result: ApiResult<T>) -> CallResponse<T> {
    result.map_err(CallError::from)
}

/// Asynchronous access to cluster resources.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Read a resource. A missing resource is `Ok(None)`, not an error.
    async fn read_resource(&self, id: &ResourceId) -> ApiResult<Option<Value>>;

    /// Create a resource and return it as stored.
    async fn create_resource(&self, id: &ResourceId, body: Value) -> ApiResult<Value>;

    /// Replace a resource and return it as stored.
    async fn replace_resource(&self, id: &ResourceId, body: Value) -> ApiResult<Value>;

    /// Delete a resource.
    async fn delete_resource(&self, id: &ResourceId) -> ApiResult<()>;
}
