#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # domop
//!
//! Domain operator core: a step-chain reconciliation engine, effective
//! configuration of domain resources and singleton resource reconcilers.
//!
//! This library re-exports the workspace crates and hosts the `domop` CLI.

pub use domop_core;
pub use domop_domain;
pub use domop_reconcile;
pub use domop_work;

pub mod cli;
pub mod commands;
