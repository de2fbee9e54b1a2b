//! Core types shared by the domop crates.
//!
//! - [`Error`] / [`Result`]: typed errors for configuration and file loading
//! - [`ResultExt`]: logging combinators
//! - [`OperatorConfig`]: layered operator configuration

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod result;

pub use config::{OperatorConfig, RetrySettings, WebhookSettings, ENV_PREFIX};
pub use error::Error;
pub use result::{Result, ResultExt};
