//! Error types for the reconcile crate.

use thiserror::Error;

/// Result type alias for reconcile operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconcile error types.
///
/// Remote-call failures are not represented here; they travel through the
/// step chain as call outcomes.
#[derive(Debug, Error)]
pub enum Error {
    /// A resource body could not be converted to or from its typed model.
    #[error("invalid {kind} resource: {reason}")]
    InvalidResource { kind: String, reason: String },

    /// Running a chain on the scheduler failed.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] domop_work::Error),
}

impl Error {
    /// Create an invalid resource error.
    pub fn invalid_resource(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResource {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}
