//! Steps that issue a remote call and suspend the fiber.

use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use crate::action::{NextAction, PendingCall, Suspension};
use crate::call::{CallAttempt, CallError, CallResponse, CALL_ATTEMPT};
use crate::packet::Packet;
use crate::step::{Step, StepRef};

type RequestFn<T> = dyn Fn(&Packet) -> BoxFuture<'static, CallResponse<T>> + Send + Sync;

/// Issues one remote call per application and resumes at a response step.
///
/// The step records itself as the issuer of the call so a response step can
/// re-run it on retry. Re-applying the same call step bumps the attempt
/// counter.
pub struct CallStep<T> {
    name: String,
    me: Weak<CallStep<T>>,
    timeout: Option<Duration>,
    on_response: StepRef,
    request: Box<RequestFn<T>>,
}

impl<T: Send + 'static> CallStep<T> {
    /// Create a call step.
    ///
    /// `request` builds the call from the current packet; it runs on a
    /// scheduler worker and must not block. A call that outlives `timeout`
    /// resolves to a timeout error.
    pub fn new<F>(
        name: impl Into<String>,
        timeout: Option<Duration>,
        on_response: StepRef,
        request: F,
    ) -> Arc<Self>
    where
        F: Fn(&Packet) -> BoxFuture<'static, CallResponse<T>> + Send + Sync + 'static,
    {
        let name = name.into();
        Arc::new_cyclic(|me| Self {
            name,
            me: me.clone(),
            timeout,
            on_response,
            request: Box::new(request),
        })
    }

    fn next_attempt(&self, packet: &mut Packet) -> u32 {
        match packet.take::<CallAttempt>(CALL_ATTEMPT) {
            Some(previous) if previous.call == self.name => previous.attempt.saturating_add(1),
            _ => 1,
        }
    }
}

impl<T: Send + 'static> Step for CallStep<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, mut packet: Packet) -> NextAction {
        let attempt = self.next_attempt(&mut packet);
        if let Some(me) = self.me.upgrade() {
            let issuer: StepRef = me;
            packet.insert(CALL_ATTEMPT, CallAttempt::new(issuer, attempt, &self.name));
        }

        debug!(
            fiber_id = %packet.fiber_id(),
            call = %self.name,
            attempt,
            "Issuing call"
        );

        let request = (self.request)(&packet);
        let timeout = self.timeout;
        let name = self.name.clone();
        let call: PendingCall = Box::pin(async move {
            let response = match timeout {
                Some(limit) => tokio::time::timeout(limit, request)
                    .await
                    .unwrap_or_else(|_| Err(CallError::timeout(&name, limit))),
                None => request.await,
            };
            Box::new(response) as Box<dyn Any + Send>
        });

        NextAction::Suspend(Suspension {
            packet,
            on_resume: Arc::clone(&self.on_response),
            call,
            call_name: self.name.clone(),
        })
    }
}
