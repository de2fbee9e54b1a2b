//! CLI command handlers.
//!
//! Every handler returns a [`Report`]: the JSON document to print and
//! whether the command succeeded. Failures to even run a command are
//! `anyhow` errors with context.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use itertools::Itertools;
use serde_json::{json, Map, Value};
use tracing::info;

use domop_core::OperatorConfig;
use domop_domain::{
    compute_effective_cluster_config, compute_effective_clustered_server_config,
    compute_effective_server_config, Domain,
};
use domop_reconcile::hash::{has_current_hash, with_content_hash};
use domop_reconcile::{
    desired_webhook_configuration, is_safe_diff, ClusterClient, InMemoryCluster, ModelDiff,
    SingletonOutcome, WebhookInputs, WebhookReconciler,
};
use domop_work::{FiberScheduler, Packet, SchedulerConfig};

use crate::cli::Commands;

/// Result of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Document printed on stdout.
    pub output: Value,
    /// Whether the process exits successfully.
    pub success: bool,
}

impl Report {
    fn ok(output: Value) -> Self {
        Self {
            output,
            success: true,
        }
    }
}

/// Execute a CLI command.
///
/// # Errors
///
/// Returns an error if input files cannot be loaded or a computation fails.
pub async fn execute_command(command: Commands, config: &OperatorConfig) -> Result<Report> {
    match command {
        Commands::Effective {
            domain,
            server,
            cluster,
        } => cmd_effective(&domain, server.as_deref(), cluster.as_deref()),

        Commands::Diff { current, past } => cmd_diff(&current, &past),

        Commands::Webhook {
            namespace,
            existing_namespace,
        } => cmd_webhook(config, namespace, existing_namespace).await,
    }
}

/// Effective configuration of one server, one cluster, or the whole domain.
fn cmd_effective(path: &Path, server: Option<&str>, cluster: Option<&str>) -> Result<Report> {
    let domain = Domain::from_file(path)
        .with_context(|| format!("Failed to load domain resource {}", path.display()))?;
    info!(domain = ?domain.metadata.name, "Computing effective configuration");

    let output = match (server, cluster) {
        (Some(server), Some(cluster)) => json!({
            "server": compute_effective_clustered_server_config(&domain, cluster, server)?
        }),
        (Some(server), None) => json!({
            "server": compute_effective_server_config(&domain, server)?
        }),
        (None, Some(cluster)) => json!({
            "cluster": compute_effective_cluster_config(&domain, cluster)?
        }),
        (None, None) => effective_summary(&domain)?,
    };
    Ok(Report::ok(output))
}

/// Every server and cluster the resource names.
fn effective_summary(domain: &Domain) -> Result<Value> {
    let spec = &domain.spec;
    let server_names = spec
        .as_name
        .iter()
        .chain(spec.server_startup.iter().map(|s| &s.server_name))
        .unique();

    let mut servers = Map::new();
    for name in server_names {
        let config = compute_effective_server_config(domain, name)?;
        servers.insert(name.clone(), serde_json::to_value(config)?);
    }

    let mut clusters = Map::new();
    for name in spec.cluster_startup.iter().map(|c| &c.cluster_name).unique() {
        let config = compute_effective_cluster_config(domain, name)?;
        clusters.insert(name.clone(), serde_json::to_value(config)?);
    }

    Ok(json!({ "servers": servers, "clusters": clusters }))
}

/// Changed model between two configuration models.
fn cmd_diff(current: &Path, past: &Path) -> Result<Report> {
    let current = load_model(current)?;
    let past = load_model(past)?;

    let diff = ModelDiff::new(&current, &past);
    for path in diff.added_paths() {
        info!(path = %path, "Added");
    }
    let changed = diff.changed_model();
    let safe = is_safe_diff(&changed);
    info!(safe, changed = diff.changed_paths().len(), "Model diff computed");

    Ok(Report {
        output: changed,
        success: safe,
    })
}

fn load_model(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read model {}", path.display()))?;
    let model = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse YAML model {}", path.display()))?,
        _ => serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse JSON model {}", path.display()))?,
    };
    Ok(model)
}

/// Run the webhook reconcile chain once on a fresh scheduler.
async fn cmd_webhook(
    config: &OperatorConfig,
    namespace: Option<String>,
    existing_namespace: Option<String>,
) -> Result<Report> {
    let mut settings = config.webhook.clone();
    if let Some(namespace) = namespace {
        settings.namespace = namespace;
    }
    let inputs = WebhookInputs::from(&settings);

    let cluster = Arc::new(InMemoryCluster::new());
    if let Some(existing) = existing_namespace {
        let current = with_content_hash(desired_webhook_configuration(&WebhookInputs {
            namespace: existing,
            ..inputs.clone()
        }))?;
        cluster
            .seed(&current.resource_id(), current.to_value()?)
            .await
            .context("Failed to seed existing webhook configuration")?;
    }

    let client: Arc<dyn ClusterClient> = cluster.clone();
    let reconciler = WebhookReconciler::from_config(client, config);
    let chain = reconciler.build_step_chain(&inputs, None)?;

    let scheduler = FiberScheduler::start(SchedulerConfig::from(config))?;
    let fiber = scheduler
        .run(chain, Packet::new())
        .await
        .context("Webhook reconcile fiber did not complete")?;
    scheduler.shutdown();

    let outcome = SingletonOutcome::from_packet(&fiber.packet);
    info!(
        fiber_id = %fiber.fiber_id,
        outcome = outcome.map(SingletonOutcome::as_str),
        steps = fiber.steps_executed,
        "Webhook reconcile finished"
    );

    let desired = desired_webhook_configuration(&inputs);
    let stored = cluster.get(&desired.resource_id()).await;
    let calls = cluster.calls();
    let output = json!({
        "outcome": outcome.map(SingletonOutcome::as_str),
        "error": fiber.error().map(ToString::to_string),
        "calls": {
            "reads": calls.reads,
            "creates": calls.creates,
            "replaces": calls.replaces,
        },
        "hashCurrent": stored.as_ref().is_some_and(has_current_hash),
        "webhookConfiguration": stored,
    });
    Ok(Report {
        output,
        success: fiber.is_success(),
    })
}
