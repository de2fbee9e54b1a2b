//! Convergence of cluster resources the operator owns.
//!
//! - [`ClusterClient`]: the asynchronous cluster API boundary, with
//!   [`InMemoryCluster`] for dry runs and tests
//! - [`singleton`]: read, create-or-replace chains for singleton resources,
//!   built from `domop-work` call and response steps
//! - [`WebhookReconciler`]: the validating webhook configuration chain
//! - [`hash`]: content hashing stored as an annotation
//! - [`diff`]: changed-model projection between two configuration models

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod client;
pub mod diff;
pub mod error;
pub mod hash;
pub mod memory;
pub mod model;
pub mod singleton;
pub mod webhook;

pub use client::{into_call_response, ApiError, ApiResult, ClusterClient, ResourceId, ResourceKind};
pub use diff::{is_safe_diff, ModelDiff};
pub use error::{Error, Result};
pub use memory::{CallCounts, InMemoryCluster, Operation, RecordedCall};
pub use model::{desired_webhook_configuration, ValidatingWebhookConfiguration, WebhookInputs};
pub use singleton::{SingletonOutcome, SingletonReconciler, SingletonResource, SINGLETON_OUTCOME};
pub use webhook::WebhookReconciler;
