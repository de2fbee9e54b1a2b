//! Validating webhook reconcile chains run on the fiber scheduler against an
//! in-memory cluster.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use domop_reconcile::hash::{content_hash, stored_hash};
use domop_reconcile::model::validating_webhook_kind;
use domop_reconcile::{
    desired_webhook_configuration, ApiError, ClusterClient, InMemoryCluster, Operation,
    ResourceId, SingletonOutcome, ValidatingWebhookConfiguration, WebhookInputs,
    WebhookReconciler,
};
use domop_work::{
    FiberOutcome, FiberScheduler, FnStep, Packet, RetryPolicy, SchedulerConfig, StepRef,
    FIBER_ERROR,
};
use serde_json::{json, Value};

fn unwrap_result<T, E: std::fmt::Display>(result: std::result::Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{}: {}", context, e),
    }
}

fn webhook_id() -> ResourceId {
    ResourceId::cluster_scoped(validating_webhook_kind(), "domop.validating.webhook")
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(3)
        .with_delays(Duration::from_millis(1), Duration::from_millis(5))
}

fn marker(name: &'static str) -> StepRef {
    FnStep::effect(name, None, move |packet| packet.insert(name, true)).into_ref()
}

struct Harness {
    cluster: Arc<InMemoryCluster>,
    scheduler: FiberScheduler,
    reconciler: WebhookReconciler,
}

impl Harness {
    fn new() -> Self {
        let cluster = Arc::new(InMemoryCluster::new());
        let client: Arc<dyn ClusterClient> = cluster.clone();
        Self {
            reconciler: WebhookReconciler::new(client, fast_policy(), Some(Duration::from_secs(5))),
            scheduler: unwrap_result(
                FiberScheduler::start(SchedulerConfig { workers: 2 }),
                "scheduler should start",
            ),
            cluster,
        }
    }

    async fn reconcile(&self, inputs: &WebhookInputs) -> FiberOutcome {
        let chain = unwrap_result(
            self.reconciler.build_step_chain_with_next(
                inputs,
                Some(marker("conflict")),
                Some(marker("next")),
            ),
            "build chain",
        );
        unwrap_result(self.scheduler.run(chain, Packet::new()).await, "fiber")
    }

    async fn seed(&self, namespace: &str) -> Value {
        let existing = desired_webhook_configuration(&WebhookInputs::new(namespace));
        let body = unwrap_result(existing.to_value(), "serialize");
        unwrap_result(self.cluster.seed(&webhook_id(), body).await, "seed")
    }

    async fn stored(&self) -> Value {
        match self.cluster.get(&webhook_id()).await {
            Some(value) => value,
            None => panic!("webhook configuration should be stored"),
        }
    }
}

fn outcome_of(fiber: &FiberOutcome) -> Option<SingletonOutcome> {
    SingletonOutcome::from_packet(&fiber.packet)
}

fn reached(fiber: &FiberOutcome, marker: &str) -> bool {
    fiber.packet.get::<bool>(marker).copied().unwrap_or(false)
}

#[tokio::test]
async fn test_creates_when_not_found() {
    let harness = Harness::new();

    let fiber = harness
        .reconcile(&WebhookInputs::new("ns-a").with_certificate_data("Y2VydA=="))
        .await;

    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::Created));
    assert!(reached(&fiber, "next"));
    assert!(!reached(&fiber, "conflict"));
    let calls = harness.cluster.calls();
    assert_eq!((calls.reads, calls.creates, calls.replaces), (1, 1, 0));

    let stored = harness.stored().await;
    assert_eq!(stored["webhooks"][0]["clientConfig"]["service"]["namespace"], "ns-a");
    assert_eq!(stored["webhooks"][0]["clientConfig"]["caBundle"], "Y2VydA==");
    assert_eq!(stored["metadata"]["labels"]["domop.io/createdByOperator"], "true");
    assert_eq!(stored_hash(&stored), Some(content_hash(&stored).as_str()));
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let harness = Harness::new();
    let inputs = WebhookInputs::new("ns-a");

    harness.reconcile(&inputs).await;
    let fiber = harness.reconcile(&inputs).await;

    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::Unchanged));
    assert!(reached(&fiber, "next"));
    let calls = harness.cluster.calls();
    assert_eq!(calls.reads, 2);
    assert_eq!(calls.writes(), 1);
}

#[tokio::test]
async fn test_replaces_on_namespace_change_preserving_foreign_fields() {
    let harness = Harness::new();
    let mut seeded = harness.seed("ns-a").await;
    seeded["webhooks"][0]["timeoutSeconds"] = json!(7);
    seeded["metadata"]["annotations"] = json!({"team": "platform"});
    let seeded = unwrap_result(
        harness.cluster.replace_resource(&webhook_id(), seeded).await,
        "add foreign fields",
    );

    let fiber = harness
        .reconcile(&WebhookInputs::new("ns-b").with_certificate_data("Y2VydA=="))
        .await;

    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::Replaced));
    assert!(reached(&fiber, "next"));

    let requests = harness.cluster.requests().await;
    let Some(submitted) = requests
        .iter()
        .rev()
        .find(|call| call.operation == Operation::Replace)
        .and_then(|call| call.body.clone())
    else {
        panic!("a replace should have been submitted");
    };
    assert_eq!(submitted["metadata"]["uid"], seeded["metadata"]["uid"]);
    assert_eq!(
        submitted["metadata"]["resourceVersion"],
        seeded["metadata"]["resourceVersion"]
    );
    assert_eq!(submitted["metadata"]["annotations"]["team"], "platform");
    assert_eq!(submitted["webhooks"][0]["timeoutSeconds"], 7);
    assert_eq!(submitted["webhooks"][0]["clientConfig"]["service"]["namespace"], "ns-b");
    assert_eq!(submitted["webhooks"][0]["clientConfig"]["caBundle"], "Y2VydA==");

    let stored = harness.stored().await;
    assert_eq!(stored["webhooks"][0]["clientConfig"]["service"]["namespace"], "ns-b");
    assert_eq!(stored["metadata"]["uid"], seeded["metadata"]["uid"]);
}

#[tokio::test]
async fn test_replace_keeps_url_webhook_and_foreign_entries() {
    let harness = Harness::new();
    let existing = json!({
        "metadata": {"name": "domop.validating.webhook"},
        "webhooks": [
            {
                "name": "url-hook",
                "admissionReviewVersions": ["v1"],
                "clientConfig": {"url": "https://hooks.example.com/validate"}
            },
            {
                "name": "other-team-hook",
                "admissionReviewVersions": ["v1"],
                "clientConfig": {
                    "service": {"namespace": "other", "name": "other-svc"}
                }
            }
        ]
    });
    unwrap_result(harness.cluster.seed(&webhook_id(), existing).await, "seed");

    let fiber = harness.reconcile(&WebhookInputs::new("ns-b")).await;

    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::Replaced));
    let stored = harness.stored().await;
    let names: Vec<&str> = stored["webhooks"]
        .as_array()
        .map(|hooks| hooks.iter().filter_map(|hook| hook["name"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec!["url-hook", "other-team-hook"]);
    assert_eq!(
        stored["webhooks"][0]["clientConfig"],
        json!({"url": "https://hooks.example.com/validate"})
    );
    assert_eq!(stored["webhooks"][1]["clientConfig"]["service"]["namespace"], "other");
}

#[tokio::test]
async fn test_permission_denied_is_tolerated_at_every_call() {
    for (operation, seed) in [
        (Operation::Read, false),
        (Operation::Create, false),
        (Operation::Replace, true),
    ] {
        let harness = Harness::new();
        if seed {
            harness.seed("ns-a").await;
        }
        harness.cluster.fail_next(operation, ApiError::status(403, "forbidden")).await;

        let fiber = harness.reconcile(&WebhookInputs::new("ns-b")).await;

        assert_eq!(
            outcome_of(&fiber),
            Some(SingletonOutcome::PermissionDenied),
            "{operation:?}"
        );
        assert!(reached(&fiber, "next"), "{operation:?}");
        assert!(!reached(&fiber, "conflict"), "{operation:?}");
        assert!(fiber.error().is_none(), "{operation:?}");
    }
}

#[tokio::test]
async fn test_unauthorized_read_is_tolerated() {
    let harness = Harness::new();
    harness.cluster.fail_next(Operation::Read, ApiError::unauthorized()).await;

    let fiber = harness.reconcile(&WebhookInputs::new("ns-a")).await;

    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::PermissionDenied));
    assert_eq!(harness.cluster.calls().writes(), 0);
}

#[tokio::test]
async fn test_terminal_create_failure_routes_to_conflict() {
    let harness = Harness::new();
    harness
        .cluster
        .fail_next(Operation::Create, ApiError::status(422, "invalid"))
        .await;

    let fiber = harness.reconcile(&WebhookInputs::new("ns-a")).await;

    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::Conflict));
    assert!(reached(&fiber, "conflict"));
    assert!(!reached(&fiber, "next"));
    assert_eq!(fiber.error().and_then(|e| e.http_status()), Some(422));
}

#[tokio::test]
async fn test_stale_replace_routes_to_conflict() {
    let harness = Harness::new();
    harness.seed("ns-a").await;
    harness
        .cluster
        .fail_next(
            Operation::Replace,
            ApiError::conflict(&webhook_id(), "resourceVersion is stale"),
        )
        .await;

    let fiber = harness.reconcile(&WebhookInputs::new("ns-b")).await;

    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::Conflict));
    assert!(reached(&fiber, "conflict"));
    assert!(fiber.error().is_some_and(|e| e.is_conflict()));
    assert_eq!(harness.cluster.calls().replaces, 1);
}

#[tokio::test]
async fn test_retryable_read_is_retried() {
    let harness = Harness::new();
    harness
        .cluster
        .fail_next(Operation::Read, ApiError::status(503, "unavailable"))
        .await;
    harness.cluster.fail_next(Operation::Read, ApiError::transport("reset")).await;

    let fiber = harness.reconcile(&WebhookInputs::new("ns-a")).await;

    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::Created));
    assert_eq!(fiber.retries, 2);
    assert_eq!(harness.cluster.calls().reads, 3);
}

#[tokio::test]
async fn test_exhausted_retries_route_to_conflict() {
    let harness = Harness::new();
    for _ in 0..3 {
        harness
            .cluster
            .fail_next(Operation::Create, ApiError::status(500, "boom"))
            .await;
    }

    let fiber = harness.reconcile(&WebhookInputs::new("ns-a")).await;

    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::Conflict));
    assert!(reached(&fiber, "conflict"));
    assert_eq!(harness.cluster.calls().creates, 3);
}

#[tokio::test]
async fn test_without_conflict_step_error_is_recorded() {
    let harness = Harness::new();
    harness
        .cluster
        .fail_next(Operation::Read, ApiError::status(400, "bad request"))
        .await;
    let chain = unwrap_result(
        harness.reconciler.build_step_chain(&WebhookInputs::new("ns-a"), None),
        "build chain",
    );

    let fiber = unwrap_result(harness.scheduler.run(chain, Packet::new()).await, "fiber");

    assert!(fiber.packet.contains(FIBER_ERROR));
    assert_eq!(fiber.error().and_then(|e| e.http_status()), Some(400));
    assert!(!fiber.is_success());
}

#[tokio::test]
async fn test_delete_chain() {
    let harness = Harness::new();
    harness.seed("ns-a").await;

    let chain = harness.reconciler.build_delete_chain(None, Some(marker("next")));
    let fiber = unwrap_result(harness.scheduler.run(chain, Packet::new()).await, "fiber");
    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::Deleted));
    assert!(harness.cluster.is_empty().await);

    let chain = harness.reconciler.build_delete_chain(None, Some(marker("next")));
    let fiber = unwrap_result(harness.scheduler.run(chain, Packet::new()).await, "fiber");
    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::Unchanged));
}

#[tokio::test]
async fn test_unreadable_existing_object_routes_to_conflict() {
    let harness = Harness::new();
    unwrap_result(
        harness
            .cluster
            .seed(&webhook_id(), json!({"webhooks": [{"admissionReviewVersions": "v1"}]}))
            .await,
        "seed",
    );

    let fiber = harness.reconcile(&WebhookInputs::new("ns-a")).await;

    assert_eq!(outcome_of(&fiber), Some(SingletonOutcome::Conflict));
    assert_eq!(fiber.error().and_then(|e| e.http_status()), Some(422));
    assert_eq!(harness.cluster.calls().writes(), 0);
}

#[tokio::test]
async fn test_many_reconciles_share_the_scheduler() {
    let harness = Harness::new();
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let chain = unwrap_result(
                harness.reconciler.build_step_chain(&WebhookInputs::new("ns-a"), None),
                "build chain",
            );
            unwrap_result(harness.scheduler.submit(chain, Packet::new()), "submit")
        })
        .collect();

    for handle in handles {
        let fiber = unwrap_result(handle.join().await, "join");
        assert!(matches!(
            outcome_of(&fiber),
            Some(
                SingletonOutcome::Created
                    | SingletonOutcome::Unchanged
                    | SingletonOutcome::Conflict
            )
        ));
    }

    let stored: ValidatingWebhookConfiguration =
        unwrap_result(serde_json::from_value(harness.stored().await), "parse stored");
    assert_eq!(stored.service_namespace(), Some("ns-a"));
    assert!(harness.cluster.calls().creates >= 1);
}
