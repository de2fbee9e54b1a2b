//! Domain resource model and effective configuration.
//!
//! Computes the authoritative desired state of a domain from its partially
//! specified resource plus layered defaults:
//!
//! - [`ServerConfig`] per server: image, pull policy, node port, desired
//!   state, env, shutdown settings and the computed [`StartPolicy`].
//! - [`ClusterConfig`] per cluster: replica count with pinned bounds.
//! - [`update_desired_replicas`] writes a cluster's replica count back into
//!   the resource.
//!
//! Everything here is pure computation; no I/O happens outside of
//! [`Domain::from_file`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod builder;
pub mod effective;
pub mod error;
pub mod model;
pub mod startup;

pub use builder::{
    compute_effective_cluster_config, compute_effective_clustered_server_config,
    compute_effective_server_config, update_desired_replicas, SchemaVersion,
};
pub use effective::{ClusterConfig, ServerConfig};
pub use error::{Error, Result};
pub use model::{ClusterStartup, Domain, DomainMeta, DomainSpec, EnvVar, ServerStartup};
pub use startup::{StartPolicy, StartupControl};
