//! Remote-call outcome taxonomy and retry policy.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use domop_core::RetrySettings;
use thiserror::Error;

use crate::step::StepRef;

/// Packet key holding the raw [`CallResponse`] of the last completed call.
pub const CALL_RESPONSE: &str = "domop.call.response";
/// Packet key holding the [`CallAttempt`] of the call in flight.
pub const CALL_ATTEMPT: &str = "domop.call.attempt";
/// Packet key holding the last [`CallError`] that left a response step
/// through the conflict or termination route.
pub const FIBER_ERROR: &str = "domop.fiber.error";

/// Status codes that signal a transient server-side condition.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// How a call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorKind {
    /// The server answered with an HTTP status.
    Status(u16),
    /// The call's deadline passed before a response arrived.
    Timeout,
    /// No response was received at all.
    Transport,
}

/// Error detail of a failed remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CallError {
    kind: CallErrorKind,
    message: String,
    body: Option<String>,
}

impl CallError {
    /// Create an error for an HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: CallErrorKind::Status(status),
            message: message.into(),
            body: None,
        }
    }

    /// Create a timeout error for the named call.
    pub fn timeout(call: &str, after: Duration) -> Self {
        Self {
            kind: CallErrorKind::Timeout,
            message: format!("call '{call}' timed out after {}ms", after.as_millis()),
            body: None,
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: CallErrorKind::Transport,
            message: message.into(),
            body: None,
        }
    }

    /// Attach the response body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Not found (404).
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(404, message)
    }

    /// Unauthorized (401).
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::status(401, message)
    }

    /// Forbidden (403).
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::status(403, message)
    }

    /// Conflict (409).
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::status(409, message)
    }

    /// Service unavailable (503).
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::status(503, message)
    }

    /// Failure kind.
    pub const fn kind(&self) -> CallErrorKind {
        self.kind
    }

    /// HTTP status, if the server answered.
    pub const fn http_status(&self) -> Option<u16> {
        match self.kind {
            CallErrorKind::Status(status) => Some(status),
            CallErrorKind::Timeout | CallErrorKind::Transport => None,
        }
    }

    /// Error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Response body, if any.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// 401 or 403.
    pub const fn is_not_authorized_or_forbidden(&self) -> bool {
        matches!(self.kind, CallErrorKind::Status(401 | 403))
    }

    /// 409.
    pub const fn is_conflict(&self) -> bool {
        matches!(self.kind, CallErrorKind::Status(409))
    }

    /// Whether this failure may succeed if the same call is issued again.
    pub fn is_retryable(&self, policy: &RetryPolicy) -> bool {
        match self.kind {
            CallErrorKind::Status(status) => RETRYABLE_STATUSES.contains(&status),
            CallErrorKind::Timeout => policy.retry_on_timeout,
            CallErrorKind::Transport => true,
        }
    }

    /// Rewrite as the terminal error reported once retries are used up.
    #[must_use]
    pub fn exhausted(mut self, attempts: u32) -> Self {
        self.message = format!("{} (gave up after {attempts} attempts)", self.message);
        self
    }
}

/// Raw result of a remote call as produced by a client.
pub type CallResponse<T> = std::result::Result<T, CallError>;

/// Classified result of a remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// The call succeeded.
    Success(T),
    /// The call failed but may be retried.
    FailureRetryable(CallError),
    /// The call failed for good.
    FailureTerminal {
        error: CallError,
        status: Option<u16>,
    },
}

impl<T> CallOutcome<T> {
    /// Classify a raw response under the given policy.
    pub fn classify(response: CallResponse<T>, policy: &RetryPolicy) -> Self {
        match response {
            Ok(value) => Self::Success(value),
            Err(error) if error.is_retryable(policy) => Self::FailureRetryable(error),
            Err(error) => {
                let status = error.http_status();
                Self::FailureTerminal { error, status }
            }
        }
    }

    /// Whether this is a terminal 401/403.
    pub const fn is_not_authorized_or_forbidden(&self) -> bool {
        matches!(self, Self::FailureTerminal { status: Some(401 | 403), .. })
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts per call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Whether a breached deadline counts as retryable.
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_backoff_ms),
            max_delay: Duration::from_millis(settings.max_backoff_ms),
            retry_on_timeout: settings.retry_on_timeout,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            retry_on_timeout: false,
        }
    }

    /// Override the attempt bound.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the backoff delays.
    #[must_use]
    pub const fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    /// Delay before re-issuing a call whose `attempt`-th try just failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether another attempt is allowed after `attempt` tries.
    pub const fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// The call currently in flight for a fiber.
///
/// Written by the call step before it suspends so the response step can
/// re-target the same call on retry.
#[derive(Clone)]
pub struct CallAttempt {
    /// The step that issued the call.
    pub issuer: StepRef,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Name of the call.
    pub call: String,
}

impl CallAttempt {
    /// Create a record for the given issuer.
    pub fn new(issuer: StepRef, attempt: u32, call: impl Into<String>) -> Self {
        Self {
            issuer,
            attempt,
            call: call.into(),
        }
    }

    /// Shared reference to the issuing step.
    pub fn issuer(&self) -> StepRef {
        Arc::clone(&self.issuer)
    }
}

impl fmt::Debug for CallAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallAttempt")
            .field("issuer", &self.issuer.name())
            .field("attempt", &self.attempt)
            .field("call", &self.call)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_authorized_and_forbidden_are_terminal() {
        let policy = RetryPolicy::default();
        for error in [CallError::unauthorized("no"), CallError::forbidden("no")] {
            let outcome = CallOutcome::<()>::classify(Err(error), &policy);
            assert!(outcome.is_not_authorized_or_forbidden());
        }
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let policy = RetryPolicy::default();
        for status in [429, 500, 502, 503, 504] {
            let outcome = CallOutcome::<()>::classify(Err(CallError::status(status, "x")), &policy);
            assert!(matches!(outcome, CallOutcome::FailureRetryable(_)), "{status}");
        }
    }

    #[test]
    fn test_conflict_is_terminal_with_status() {
        let outcome =
            CallOutcome::<()>::classify(Err(CallError::conflict("stale")), &RetryPolicy::default());
        assert!(matches!(
            outcome,
            CallOutcome::FailureTerminal {
                status: Some(409),
                ..
            }
        ));
        assert!(!outcome.is_not_authorized_or_forbidden());
    }

    #[test]
    fn test_timeout_follows_policy() {
        let error = CallError::timeout("read", Duration::from_millis(5));
        let retrying = RetryPolicy::default();
        let strict = RetryPolicy::no_retry();

        assert!(matches!(
            CallOutcome::<()>::classify(Err(error.clone()), &retrying),
            CallOutcome::FailureRetryable(_)
        ));
        assert!(matches!(
            CallOutcome::<()>::classify(Err(error), &strict),
            CallOutcome::FailureTerminal { status: None, .. }
        ));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default()
            .with_delays(Duration::from_millis(100), Duration::from_millis(1_000));

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(200), Duration::from_millis(1_000));
    }

    #[test]
    fn test_policy_from_settings_never_zero_attempts() {
        let settings = RetrySettings {
            max_attempts: 0,
            ..RetrySettings::default()
        };
        assert_eq!(RetryPolicy::from(&settings).max_attempts, 1);
    }

    #[test]
    fn test_exhausted_message() {
        let error = CallError::unavailable("busy").exhausted(3);
        assert!(error.message().contains("3 attempts"));
        assert_eq!(error.http_status(), Some(503));
    }
}
