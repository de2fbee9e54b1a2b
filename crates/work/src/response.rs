//! Response steps: dispatch on the outcome of a remote call.
//!
//! A [`ResponseStep`] is the step a fiber resumes at after a call completes.
//! It classifies the raw response and hands it to one of three handlers.
//! Routing targets (`next`, the conflict step, a retry of the issuing call)
//! are exposed to the handlers through [`Routes`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::action::NextAction;
use crate::call::{
    CallAttempt, CallError, CallOutcome, CallResponse, RetryPolicy, CALL_ATTEMPT, CALL_RESPONSE,
    FIBER_ERROR,
};
use crate::packet::Packet;
use crate::step::{do_next, Step, StepRef};

/// Routing targets available to response handlers.
pub struct Routes<'a> {
    step: &'a str,
    next: Option<&'a StepRef>,
    conflict: Option<&'a StepRef>,
    policy: &'a RetryPolicy,
}

impl Routes<'_> {
    /// Continue down the chain.
    pub fn next(&self, packet: Packet) -> NextAction {
        do_next(self.next, packet)
    }

    /// Give up on this attempt and continue at the conflict step.
    ///
    /// Without a conflict step the fiber terminates with the error recorded.
    pub fn conflict(&self, mut packet: Packet, error: CallError) -> NextAction {
        match self.conflict {
            Some(conflict) => {
                debug!(step = self.step, error = %error, "Routing to conflict step");
                packet.insert(FIBER_ERROR, error);
                NextAction::Continue {
                    step: Arc::clone(conflict),
                    packet,
                }
            }
            None => self.terminate(packet, error),
        }
    }

    /// End the fiber, recording the error in the packet.
    pub fn terminate(&self, mut packet: Packet, error: CallError) -> NextAction {
        warn!(step = self.step, error = %error, "Terminating fiber");
        packet.insert(FIBER_ERROR, error);
        NextAction::Done(packet)
    }

    /// Re-issue the call that produced this response after a backoff delay.
    ///
    /// Falls back to the conflict route when the issuing call is unknown.
    pub fn retry(&self, packet: Packet, error: CallError) -> NextAction {
        let Some(attempt) = packet.get::<CallAttempt>(CALL_ATTEMPT).cloned() else {
            return self.conflict(packet, error);
        };

        let delay = self.policy.delay_for(attempt.attempt);
        debug!(
            step = self.step,
            call = %attempt.call,
            attempt = attempt.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Retrying call"
        );
        NextAction::Retry {
            delay,
            step: attempt.issuer(),
            packet,
        }
    }

    /// The retry policy in force.
    pub const fn policy(&self) -> &RetryPolicy {
        self.policy
    }
}

type SuccessFn<T> = dyn Fn(&Routes<'_>, Packet, T) -> NextAction + Send + Sync;
type FailureFn = dyn Fn(&Routes<'_>, Packet, CallError) -> NextAction + Send + Sync;

fn continue_on_success<T>(routes: &Routes<'_>, packet: Packet, _value: T) -> NextAction {
    routes.next(packet)
}

fn retry_on_failure(routes: &Routes<'_>, packet: Packet, error: CallError) -> NextAction {
    routes.retry(packet, error)
}

fn conflict_on_failure(routes: &Routes<'_>, packet: Packet, error: CallError) -> NextAction {
    routes.conflict(packet, error)
}

/// A step that dispatches a call outcome to one of three handlers.
pub struct ResponseStep<T> {
    name: String,
    next: Option<StepRef>,
    conflict: Option<StepRef>,
    policy: RetryPolicy,
    on_success: Box<SuccessFn<T>>,
    on_failure_retryable: Box<FailureFn>,
    on_failure_terminal: Box<FailureFn>,
}

impl<T: Send + 'static> ResponseStep<T> {
    /// Start building a response step.
    pub fn builder(name: impl Into<String>) -> ResponseStepBuilder<T> {
        ResponseStepBuilder::new(name)
    }

    fn routes(&self) -> Routes<'_> {
        Routes {
            step: &self.name,
            next: self.next.as_ref(),
            conflict: self.conflict.as_ref(),
            policy: &self.policy,
        }
    }

    /// Dispatch an already classified outcome.
    pub fn dispatch(&self, mut packet: Packet, outcome: CallOutcome<T>) -> NextAction {
        let routes = self.routes();
        match outcome {
            CallOutcome::Success(value) => {
                packet.remove(CALL_ATTEMPT);
                (self.on_success)(&routes, packet, value)
            }
            CallOutcome::FailureRetryable(error) => {
                let attempt = packet
                    .get::<CallAttempt>(CALL_ATTEMPT)
                    .map_or(1, |a| a.attempt);
                if self.policy.allows_another(attempt) {
                    (self.on_failure_retryable)(&routes, packet, error)
                } else {
                    warn!(step = %self.name, attempt, error = %error, "Retries exhausted");
                    packet.remove(CALL_ATTEMPT);
                    (self.on_failure_terminal)(&routes, packet, error.exhausted(attempt))
                }
            }
            CallOutcome::FailureTerminal { error, .. } => {
                packet.remove(CALL_ATTEMPT);
                (self.on_failure_terminal)(&routes, packet, error)
            }
        }
    }
}

impl<T: Send + 'static> Step for ResponseStep<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, mut packet: Packet) -> NextAction {
        let response = packet
            .take::<CallResponse<T>>(CALL_RESPONSE)
            .unwrap_or_else(|| {
                Err(CallError::transport(format!(
                    "no call response available for '{}'",
                    self.name
                )))
            });
        let outcome = CallOutcome::classify(response, &self.policy);
        self.dispatch(packet, outcome)
    }
}

/// Builder for [`ResponseStep`].
pub struct ResponseStepBuilder<T> {
    name: String,
    next: Option<StepRef>,
    conflict: Option<StepRef>,
    policy: RetryPolicy,
    on_success: Box<SuccessFn<T>>,
    on_failure_retryable: Box<FailureFn>,
    on_failure_terminal: Box<FailureFn>,
}

impl<T: Send + 'static> ResponseStepBuilder<T> {
    /// Create a builder with the default handlers: success continues,
    /// retryable failures retry, terminal failures go to the conflict step.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next: None,
            conflict: None,
            policy: RetryPolicy::default(),
            on_success: Box::new(continue_on_success::<T>),
            on_failure_retryable: Box::new(retry_on_failure),
            on_failure_terminal: Box::new(conflict_on_failure),
        }
    }

    /// Set the step that follows.
    #[must_use]
    pub fn next(mut self, next: Option<StepRef>) -> Self {
        self.next = next;
        self
    }

    /// Set the conflict step.
    #[must_use]
    pub fn conflict(mut self, conflict: Option<StepRef>) -> Self {
        self.conflict = conflict;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Handle a successful call.
    #[must_use]
    pub fn on_success<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Routes<'_>, Packet, T) -> NextAction + Send + Sync + 'static,
    {
        self.on_success = Box::new(handler);
        self
    }

    /// Handle a retryable failure while attempts remain.
    #[must_use]
    pub fn on_failure_retryable<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Routes<'_>, Packet, CallError) -> NextAction + Send + Sync + 'static,
    {
        self.on_failure_retryable = Box::new(handler);
        self
    }

    /// Handle a terminal failure, including exhausted retries.
    #[must_use]
    pub fn on_failure_terminal<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Routes<'_>, Packet, CallError) -> NextAction + Send + Sync + 'static,
    {
        self.on_failure_terminal = Box::new(handler);
        self
    }

    /// Build the step.
    pub fn build(self) -> Arc<ResponseStep<T>> {
        Arc::new(ResponseStep {
            name: self.name,
            next: self.next,
            conflict: self.conflict,
            policy: self.policy,
            on_success: self.on_success,
            on_failure_retryable: self.on_failure_retryable,
            on_failure_terminal: self.on_failure_terminal,
        })
    }
}
