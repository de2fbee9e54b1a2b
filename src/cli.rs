//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// domop - domain operator tooling
#[derive(Parser, Debug)]
#[command(name = "domop")]
#[command(version)]
#[command(
    about = "Effective configuration, model diffs and webhook reconciliation for domain resources"
)]
#[command(
    long_about = "domop computes the effective server and cluster configuration of a domain \
                  resource, diffs configuration models and dry-runs the validating webhook \
                  reconcile chain."
)]
pub struct Cli {
    /// Operator configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print effective configurations of a domain resource as JSON
    Effective {
        /// Domain resource file (YAML or JSON)
        #[arg(short, long)]
        domain: PathBuf,

        /// Only this server
        #[arg(short, long)]
        server: Option<String>,

        /// Only this cluster
        #[arg(long)]
        cluster: Option<String>,
    },

    /// Print the changed model between two configuration models
    ///
    /// Exits with status 1 when the change is not safe to apply online.
    Diff {
        /// Current model (JSON or YAML)
        current: PathBuf,

        /// Past model (JSON or YAML)
        past: PathBuf,
    },

    /// Dry-run the validating webhook reconcile chain against an in-memory cluster
    Webhook {
        /// Namespace of the webhook service
        #[arg(short, long)]
        namespace: Option<String>,

        /// Namespace the webhook configuration already points at
        #[arg(long)]
        existing_namespace: Option<String>,
    },
}
