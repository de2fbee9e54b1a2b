//! Error types for the work crate.

use thiserror::Error;

use crate::packet::FiberId;

/// Result type alias for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Scheduler error types.
///
/// Remote-call failures never surface here: they are converted into
/// [`NextAction`](crate::NextAction) values by response steps.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The scheduler no longer accepts fibers.
    #[error("scheduler stopped")]
    SchedulerStopped,
    /// A fiber was dropped before reaching `Done`.
    #[error("fiber {fiber_id} was dropped before completion")]
    FiberLost { fiber_id: FiberId },
    /// Invalid scheduler configuration.
    #[error("invalid scheduler configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a fiber lost error.
    pub const fn fiber_lost(fiber_id: FiberId) -> Self {
        Self::FiberLost { fiber_id }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
