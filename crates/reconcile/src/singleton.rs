//! Reconciliation of cluster-wide singleton resources.
//!
//! A singleton is a resource the operator owns exactly one instance of, such
//! as its validating webhook configuration. The chain built here reads the
//! resource and then creates it, replaces it or leaves it alone:
//!
//! ```text
//! read ──┬── not found ─────────────► create ──► next
//!        ├── owned fields differ ───► replace ─► next
//!        └── converged ─────────────────────────► next
//! ```
//!
//! Every call suspends the fiber. Retryable failures re-issue the call;
//! terminal failures continue at the conflict step, except that 401/403 can
//! be tolerated per chain. The result is recorded in the packet under
//! [`SINGLETON_OUTCOME`].

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use domop_work::{
    CallError, CallStep, NextAction, Packet, ResponseStep, RetryPolicy, Routes, StepRef,
};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{ClusterClient, ResourceId};

/// Packet key of the [`SingletonOutcome`].
pub const SINGLETON_OUTCOME: &str = "domop.singleton.outcome";

/// Packet key of the body a pending replace submits.
const REPLACE_BODY: &str = "domop.singleton.replace_body";

/// What a singleton chain did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingletonOutcome {
    /// The resource did not exist and was created.
    Created,
    /// The resource existed with stale owned fields and was replaced.
    Replaced,
    /// The resource already matched, or was already absent on delete.
    Unchanged,
    /// The resource was deleted.
    Deleted,
    /// A call was refused with 401/403 and the chain moved on.
    PermissionDenied,
    /// A call failed for good and the chain went to the conflict step.
    Conflict,
}

impl SingletonOutcome {
    /// Lowercase label for output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Replaced => "replaced",
            Self::Unchanged => "unchanged",
            Self::Deleted => "deleted",
            Self::PermissionDenied => "permission-denied",
            Self::Conflict => "conflict",
        }
    }

    /// Read the outcome a chain recorded in `packet`.
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        packet.get::<Self>(SINGLETON_OUTCOME).copied()
    }
}

/// A resource the operator keeps a single instance of.
pub trait SingletonResource: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identity of the resource in the cluster.
    fn resource_id(&self) -> ResourceId;

    /// Whether `self`, as found in the cluster, must be replaced to match
    /// `desired`.
    fn needs_update(&self, desired: &Self) -> bool;

    /// Overwrite the operator-owned fields of `self` with those of `desired`.
    ///
    /// Everything else, identity and metadata included, stays as is.
    fn merge_owned_fields(&mut self, desired: &Self);
}

/// Builds step chains that converge one singleton resource.
pub struct SingletonReconciler<R> {
    client: Arc<dyn ClusterClient>,
    policy: RetryPolicy,
    timeout: Option<Duration>,
    tolerate_permission_denied: bool,
    _resource: PhantomData<fn() -> R>,
}

impl<R: SingletonResource> SingletonReconciler<R> {
    /// Create a reconciler that does not tolerate 401/403.
    pub fn new(
        client: Arc<dyn ClusterClient>,
        policy: RetryPolicy,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            client,
            policy,
            timeout,
            tolerate_permission_denied: false,
            _resource: PhantomData,
        }
    }

    /// Whether 401/403 responses are logged and skipped instead of routed
    /// to the conflict step.
    #[must_use]
    pub const fn tolerate_permission_denied(mut self, tolerate: bool) -> Self {
        self.tolerate_permission_denied = tolerate;
        self
    }

    /// The retry policy applied to every call of the chain.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Build the read, create-or-replace chain for `desired`.
    pub fn build_step_chain(
        &self,
        desired: R,
        conflict: Option<StepRef>,
        next: Option<StepRef>,
    ) -> StepRef {
        let desired = Arc::new(desired);
        let id = desired.resource_id();
        let create = self.create_step(&id, Arc::clone(&desired), conflict.clone(), next.clone());
        let replace = self.replace_step(&id, conflict.clone(), next.clone());
        let tolerate = self.tolerate_permission_denied;

        let response_name = format!("read-{}-response", id.kind.kind);
        let on_read = ResponseStep::<Option<Value>>::builder(response_name)
            .next(next)
            .conflict(conflict)
            .policy(self.policy.clone())
            .on_success({
                let id = id.clone();
                move |routes, packet, existing| {
                    decide(routes, packet, existing, &id, desired.as_ref(), &create, &replace)
                }
            })
            .on_failure_terminal(move |routes, packet, error| {
                on_terminal_failure(routes, packet, error, tolerate)
            })
            .build();

        let client = Arc::clone(&self.client);
        let name = format!("read-{}", id.kind.kind);
        CallStep::new(name, self.timeout, on_read, move |_packet: &Packet| {
            let client = Arc::clone(&client);
            let id = id.clone();
            async move { client.read_resource(&id).await.map_err(CallError::from) }.boxed()
        })
    }

    /// Build a chain that deletes the resource identified by `id`.
    ///
    /// An already absent resource counts as converged.
    pub fn build_delete_chain(
        &self,
        id: ResourceId,
        conflict: Option<StepRef>,
        next: Option<StepRef>,
    ) -> StepRef {
        let tolerate = self.tolerate_permission_denied;
        let on_deleted = ResponseStep::<()>::builder(format!("delete-{}-response", id.kind.kind))
            .next(next)
            .conflict(conflict)
            .policy(self.policy.clone())
            .on_success({
                let id = id.clone();
                move |routes, mut packet, ()| {
                    info!(resource = %id, "Deleted singleton resource");
                    packet.insert(SINGLETON_OUTCOME, SingletonOutcome::Deleted);
                    routes.next(packet)
                }
            })
            .on_failure_terminal(move |routes, mut packet, error| {
                if error.http_status() == Some(404) {
                    debug!("Singleton resource already absent");
                    packet.insert(SINGLETON_OUTCOME, SingletonOutcome::Unchanged);
                    return routes.next(packet);
                }
                on_terminal_failure(routes, packet, error, tolerate)
            })
            .build();

        let client = Arc::clone(&self.client);
        let name = format!("delete-{}", id.kind.kind);
        CallStep::new(name, self.timeout, on_deleted, move |_packet: &Packet| {
            let client = Arc::clone(&client);
            let id = id.clone();
            async move { client.delete_resource(&id).await.map_err(CallError::from) }.boxed()
        })
    }

    fn create_step(
        &self,
        id: &ResourceId,
        desired: Arc<R>,
        conflict: Option<StepRef>,
        next: Option<StepRef>,
    ) -> StepRef {
        let tolerate = self.tolerate_permission_denied;
        let on_created = ResponseStep::<Value>::builder(format!("create-{}-response", id.kind.kind))
            .next(next)
            .conflict(conflict)
            .policy(self.policy.clone())
            .on_success({
                let id = id.clone();
                move |routes, mut packet, _created| {
                    info!(resource = %id, "Created singleton resource");
                    packet.insert(SINGLETON_OUTCOME, SingletonOutcome::Created);
                    routes.next(packet)
                }
            })
            .on_failure_terminal(move |routes, packet, error| {
                on_terminal_failure(routes, packet, error, tolerate)
            })
            .build();

        let client = Arc::clone(&self.client);
        let id = id.clone();
        let name = format!("create-{}", id.kind.kind);
        CallStep::new(name, self.timeout, on_created, move |_packet: &Packet| {
            let client = Arc::clone(&client);
            let id = id.clone();
            let body = serde_json::to_value(desired.as_ref());
            async move {
                let body = body.map_err(|e| unprocessable(&id, &e))?;
                client.create_resource(&id, body).await.map_err(CallError::from)
            }
            .boxed()
        })
    }

    fn replace_step(
        &self,
        id: &ResourceId,
        conflict: Option<StepRef>,
        next: Option<StepRef>,
    ) -> StepRef {
        let tolerate = self.tolerate_permission_denied;
        let response_name = format!("replace-{}-response", id.kind.kind);
        let on_replaced = ResponseStep::<Value>::builder(response_name)
            .next(next)
            .conflict(conflict)
            .policy(self.policy.clone())
            .on_success({
                let id = id.clone();
                move |routes, mut packet, _replaced| {
                    info!(resource = %id, "Replaced singleton resource");
                    packet.remove(REPLACE_BODY);
                    packet.insert(SINGLETON_OUTCOME, SingletonOutcome::Replaced);
                    routes.next(packet)
                }
            })
            .on_failure_terminal(move |routes, mut packet, error| {
                packet.remove(REPLACE_BODY);
                on_terminal_failure(routes, packet, error, tolerate)
            })
            .build();

        let client = Arc::clone(&self.client);
        let id = id.clone();
        let name = format!("replace-{}", id.kind.kind);
        CallStep::new(name, self.timeout, on_replaced, move |packet: &Packet| {
            let client = Arc::clone(&client);
            let id = id.clone();
            let body = packet.get::<Value>(REPLACE_BODY).cloned();
            async move {
                let body = body.ok_or_else(|| {
                    CallError::status(422, format!("no replacement body prepared for {id}"))
                })?;
                client.replace_resource(&id, body).await.map_err(CallError::from)
            }
            .boxed()
        })
    }
}

/// Choose create, replace or converged after a successful read.
fn decide<R: SingletonResource>(
    routes: &Routes<'_>,
    mut packet: Packet,
    existing: Option<Value>,
    id: &ResourceId,
    desired: &R,
    create: &StepRef,
    replace: &StepRef,
) -> NextAction {
    let Some(existing) = existing else {
        debug!(resource = %id, "Singleton resource not found, creating");
        return NextAction::Continue {
            step: Arc::clone(create),
            packet,
        };
    };

    let mut current = match serde_json::from_value::<R>(existing) {
        Ok(current) => current,
        Err(e) => {
            packet.insert(SINGLETON_OUTCOME, SingletonOutcome::Conflict);
            return routes.conflict(packet, unprocessable(id, &e));
        }
    };

    if !current.needs_update(desired) {
        debug!(resource = %id, "Singleton resource up to date");
        packet.insert(SINGLETON_OUTCOME, SingletonOutcome::Unchanged);
        return routes.next(packet);
    }

    current.merge_owned_fields(desired);
    match serde_json::to_value(&current) {
        Ok(body) => {
            debug!(resource = %id, "Singleton resource out of date, replacing");
            packet.insert(REPLACE_BODY, body);
            NextAction::Continue {
                step: Arc::clone(replace),
                packet,
            }
        }
        Err(e) => {
            packet.insert(SINGLETON_OUTCOME, SingletonOutcome::Conflict);
            routes.conflict(packet, unprocessable(id, &e))
        }
    }
}

fn on_terminal_failure(
    routes: &Routes<'_>,
    mut packet: Packet,
    error: CallError,
    tolerate_permission_denied: bool,
) -> NextAction {
    if tolerate_permission_denied && error.is_not_authorized_or_forbidden() {
        info!(error = %error, "Not permitted to manage singleton resource, skipping");
        packet.insert(SINGLETON_OUTCOME, SingletonOutcome::PermissionDenied);
        return routes.next(packet);
    }
    packet.insert(SINGLETON_OUTCOME, SingletonOutcome::Conflict);
    routes.conflict(packet, error)
}

fn unprocessable(id: &ResourceId, error: &serde_json::Error) -> CallError {
    CallError::status(422, format!("{id} does not match its model: {error}"))
}
