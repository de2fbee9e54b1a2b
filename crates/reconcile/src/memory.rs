//! In-memory cluster used for dry runs and tests.
//!
//! Behaves like the API server for the subset the reconcilers rely on:
//! cluster-assigned metadata, optimistic concurrency on `resourceVersion`
//! and 404/409 semantics. Failures can be queued per operation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use ulid::Ulid;

use crate::client::{ApiError, ApiResult, ClusterClient, ResourceId};

/// Cluster API operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Create,
    Replace,
    Delete,
}

/// Per-operation call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub reads: u64,
    pub creates: u64,
    pub replaces: u64,
    pub deletes: u64,
}

impl CallCounts {
    /// Number of calls that changed (or tried to change) the cluster.
    pub const fn writes(&self) -> u64 {
        self.creates + self.replaces + self.deletes
    }
}

/// A call as the cluster received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: Operation,
    pub id: ResourceId,
    /// Submitted body for create and replace.
    pub body: Option<Value>,
}

#[derive(Default)]
struct Counters {
    reads: AtomicU64,
    creates: AtomicU64,
    replaces: AtomicU64,
    deletes: AtomicU64,
}

impl Counters {
    fn record(&self, operation: Operation) {
        let counter = match operation {
            Operation::Read => &self.reads,
            Operation::Create => &self.creates,
            Operation::Replace => &self.replaces,
            Operation::Delete => &self.deletes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CallCounts {
        CallCounts {
            reads: self.reads.load(Ordering::Relaxed),
            creates: self.creates.load(Ordering::Relaxed),
            replaces: self.replaces.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

/// An in-memory [`ClusterClient`].
#[derive(Default)]
pub struct InMemoryCluster {
    store: RwLock<BTreeMap<ResourceId, Value>>,
    faults: Mutex<HashMap<Operation, VecDeque<ApiError>>>,
    requests: Mutex<Vec<RecordedCall>>,
    counters: Counters,
    versions: AtomicU64,
}

impl InMemoryCluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a resource directly, stamping cluster-assigned metadata.
    ///
    /// Seeded resources do not show up in call counts or recorded requests.
    pub async fn seed(&self, id: &ResourceId, body: Value) -> ApiResult<Value> {
        let stored = self.stamp_new(id, body)?;
        self.store.write().await.insert(id.clone(), stored.clone());
        Ok(stored)
    }

    /// Snapshot of a stored resource.
    pub async fn get(&self, id: &ResourceId) -> Option<Value> {
        self.store.read().await.get(id).cloned()
    }

    /// Number of stored resources.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    /// Make the next call of `operation` fail with `error`.
    ///
    /// Failures queue up; each call consumes at most one.
    pub async fn fail_next(&self, operation: Operation, error: ApiError) {
        self.faults
            .lock()
            .await
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Call counts so far.
    pub fn calls(&self) -> CallCounts {
        self.counters.snapshot()
    }

    /// Calls received so far, in arrival order.
    pub async fn requests(&self) -> Vec<RecordedCall> {
        self.requests.lock().await.clone()
    }

    async fn receive(
        &self,
        operation: Operation,
        id: &ResourceId,
        body: Option<&Value>,
    ) -> ApiResult<()> {
        self.counters.record(operation);
        self.requests.lock().await.push(RecordedCall {
            operation,
            id: id.clone(),
            body: body.cloned(),
        });

        let fault = self
            .faults
            .lock()
            .await
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(error) => {
                debug!(?operation, resource = %id, error = %error, "Injected failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn next_version(&self) -> String {
        (self.versions.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn stamp_new(&self, id: &ResourceId, body: Value) -> ApiResult<Value> {
        let mut body = body;
        let object = body
            .as_object_mut()
            .ok_or_else(|| ApiError::status(422, format!("{id}: body must be an object")))?;

        object
            .entry("apiVersion")
            .or_insert_with(|| Value::String(id.kind.api_version()));
        object
            .entry("kind")
            .or_insert_with(|| Value::String(id.kind.kind.clone()));

        let version = self.next_version();
        update_metadata(object, |metadata| {
            metadata.insert("name".to_string(), Value::String(id.name.clone()));
            if let Some(namespace) = &id.namespace {
                metadata.insert("namespace".to_string(), Value::String(namespace.clone()));
            }
            metadata.insert("resourceVersion".to_string(), Value::String(version));
            metadata.insert("uid".to_string(), Value::String(Ulid::new().to_string()));
            metadata.insert(
                "creationTimestamp".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        });
        Ok(body)
    }
}

fn update_metadata(object: &mut Map<String, Value>, update: impl FnOnce(&mut Map<String, Value>)) {
    let metadata = object
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    if let Value::Object(map) = metadata {
        update(map);
    }
}

fn metadata_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get("metadata")?.get(field)?.as_str()
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn read_resource(&self, id: &ResourceId) -> ApiResult<Option<Value>> {
        self.receive(Operation::Read, id, None).await?;
        Ok(self.get(id).await)
    }

    async fn create_resource(&self, id: &ResourceId, body: Value) -> ApiResult<Value> {
        self.receive(Operation::Create, id, Some(&body)).await?;

        let mut store = self.store.write().await;
        if store.contains_key(id) {
            return Err(ApiError::conflict(id, "already exists"));
        }
        let stored = self.stamp_new(id, body)?;
        store.insert(id.clone(), stored.clone());
        debug!(resource = %id, "Created");
        Ok(stored)
    }

    async fn replace_resource(&self, id: &ResourceId, body: Value) -> ApiResult<Value> {
        self.receive(Operation::Replace, id, Some(&body)).await?;

        let mut store = self.store.write().await;
        let current = store.get(id).ok_or_else(|| ApiError::not_found(id))?;

        let current_version = metadata_str(current, "resourceVersion").map(str::to_string);
        if let Some(submitted) = metadata_str(&body, "resourceVersion") {
            if current_version.as_deref() != Some(submitted) {
                return Err(ApiError::conflict(
                    id,
                    format!(
                        "resourceVersion {submitted} is stale (current {})",
                        current_version.as_deref().unwrap_or("none")
                    ),
                ));
            }
        }

        let uid = metadata_str(current, "uid").map(str::to_string);
        let created = metadata_str(current, "creationTimestamp").map(str::to_string);

        let mut body = body;
        let object = body
            .as_object_mut()
            .ok_or_else(|| ApiError::status(422, format!("{id}: body must be an object")))?;
        let version = self.next_version();
        update_metadata(object, |metadata| {
            metadata.insert("name".to_string(), Value::String(id.name.clone()));
            metadata.insert("resourceVersion".to_string(), Value::String(version));
            if let Some(uid) = uid {
                metadata.insert("uid".to_string(), Value::String(uid));
            }
            if let Some(created) = created {
                metadata.insert("creationTimestamp".to_string(), Value::String(created));
            }
        });

        store.insert(id.clone(), body.clone());
        debug!(resource = %id, "Replaced");
        Ok(body)
    }

    async fn delete_resource(&self, id: &ResourceId) -> ApiResult<()> {
        self.receive(Operation::Delete, id, None).await?;

        match self.store.write().await.remove(id) {
            Some(_) => {
                debug!(resource = %id, "Deleted");
                Ok(())
            }
            None => Err(ApiError::not_found(id)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::client::ResourceKind;
    use serde_json::json;

    fn id() -> ResourceId {
        ResourceId::cluster_scoped(
            ResourceKind::new("domop.io", "v1", "Domain", "domains"),
            "domain1",
        )
    }

    #[tokio::test]
    async fn test_create_assigns_metadata() {
        let cluster = InMemoryCluster::new();

        let stored = cluster
            .create_resource(&id(), json!({"spec": {"replicas": 2}}))
            .await
            .unwrap();

        assert_eq!(stored["metadata"]["name"], "domain1");
        assert_eq!(stored["metadata"]["resourceVersion"], "1");
        assert!(stored["metadata"]["uid"].is_string());
        assert!(stored["metadata"]["creationTimestamp"].is_string());
        assert_eq!(stored["apiVersion"], "domop.io/v1");
        assert_eq!(cluster.calls().creates, 1);
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let cluster = InMemoryCluster::new();
        cluster.create_resource(&id(), json!({})).await.unwrap();

        let err = cluster.create_resource(&id(), json!({})).await.unwrap_err();

        assert_eq!(err.status, Some(409));
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let cluster = InMemoryCluster::new();

        assert_eq!(cluster.read_resource(&id()).await.unwrap(), None);
        assert_eq!(cluster.calls().reads, 1);
    }

    #[tokio::test]
    async fn test_replace_rejects_stale_version() {
        let cluster = InMemoryCluster::new();
        let stored = cluster.seed(&id(), json!({"spec": {}})).await.unwrap();
        let mut stale = stored.clone();
        cluster.replace_resource(&id(), stored).await.unwrap();

        stale["spec"]["replicas"] = json!(3);
        let err = cluster.replace_resource(&id(), stale).await.unwrap_err();

        assert_eq!(err.status, Some(409));
    }

    #[tokio::test]
    async fn test_replace_keeps_uid_and_bumps_version() {
        let cluster = InMemoryCluster::new();
        let stored = cluster.seed(&id(), json!({})).await.unwrap();

        let replaced = cluster
            .replace_resource(&id(), json!({"spec": {"replicas": 1}}))
            .await
            .unwrap();

        assert_eq!(replaced["metadata"]["uid"], stored["metadata"]["uid"]);
        assert_ne!(
            replaced["metadata"]["resourceVersion"],
            stored["metadata"]["resourceVersion"]
        );
    }

    #[tokio::test]
    async fn test_replace_missing_is_not_found() {
        let cluster = InMemoryCluster::new();

        let err = cluster.replace_resource(&id(), json!({})).await.unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let cluster = InMemoryCluster::new();
        cluster
            .fail_next(Operation::Read, ApiError::status(503, "busy"))
            .await;
        cluster.fail_next(Operation::Read, ApiError::unauthorized()).await;

        assert_eq!(cluster.read_resource(&id()).await.unwrap_err().status, Some(503));
        assert_eq!(cluster.read_resource(&id()).await.unwrap_err().status, Some(401));
        assert!(cluster.read_resource(&id()).await.is_ok());
        assert_eq!(cluster.calls().reads, 3);
    }

    #[tokio::test]
    async fn test_delete() {
        let cluster = InMemoryCluster::new();
        cluster.seed(&id(), json!({})).await.unwrap();

        cluster.delete_resource(&id()).await.unwrap();

        assert!(cluster.is_empty().await);
        assert!(cluster.delete_resource(&id()).await.unwrap_err().is_not_found());
    }
}
