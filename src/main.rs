//! # domop
//!
//! Entry point of the `domop` command.
//!
//! 1. Parse arguments.
//! 2. Load the operator configuration: defaults, optional file, `DOMOP_*`
//!    environment overrides, validation.
//! 3. Install tracing on stderr so stdout carries only the JSON report.
//! 4. Run the command, print its report and exit 1 if it did not succeed.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domop::cli::Cli;
use domop::commands::execute_command;
use domop_core::OperatorConfig;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = OperatorConfig::load(cli.config.as_deref())
        .context("Failed to load operator configuration")?;
    init_tracing(&config.log_filter);
    debug!(?config, "Configuration loaded");

    let report = execute_command(cli.command, &config)
        .await
        .inspect_err(|e| error!("{e:#}"))?;

    println!("{}", serde_json::to_string_pretty(&report.output)?);
    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Initialize tracing with `RUST_LOG`, falling back to the configured filter.
fn init_tracing(log_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
