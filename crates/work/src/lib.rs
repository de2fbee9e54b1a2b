//! Continuation-based step chains and a fiber scheduler.
//!
//! Reconciliation logic is written as chains of [`Step`]s. Each step takes
//! the fiber's [`Packet`] and returns a [`NextAction`]:
//!
//! - **Continue** with another step on the same worker.
//! - **Suspend** on a remote call. The worker is released; the fiber resumes
//!   at a response step once the call completes.
//! - **Retry** a step after a backoff delay.
//! - **Done**: the fiber is finished.
//!
//! Remote calls are issued by [`CallStep`] and their outcomes handled by
//! [`ResponseStep`], which classifies each response as success, retryable
//! failure or terminal failure under a [`RetryPolicy`].
//!
//! # Example
//!
//! ```ignore
//! use domop_work::{CallStep, FiberScheduler, Packet, ResponseStep, SchedulerConfig};
//!
//! let scheduler = FiberScheduler::start(SchedulerConfig::default())?;
//! let on_read = ResponseStep::<Option<Value>>::builder("read-response")
//!     .on_success(|routes, packet, value| routes.next(packet))
//!     .build();
//! let read = CallStep::new("read", Some(timeout), on_read, move |_| client.read(&id));
//! let outcome = scheduler.run(read, Packet::new()).await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod action;
pub mod call;
pub mod call_step;
pub mod error;
pub mod packet;
pub mod response;
pub mod scheduler;
pub mod step;

pub use action::{NextAction, PendingCall, Suspension};
pub use call::{
    CallAttempt, CallError, CallErrorKind, CallOutcome, CallResponse, RetryPolicy, CALL_ATTEMPT,
    CALL_RESPONSE, FIBER_ERROR,
};
pub use call_step::CallStep;
pub use error::{Error, Result};
pub use packet::{FiberId, Packet};
pub use response::{ResponseStep, ResponseStepBuilder, Routes};
pub use scheduler::{FiberHandle, FiberOutcome, FiberScheduler, SchedulerConfig, SchedulerStats};
pub use step::{do_next, Chain, FnStep, Step, StepRef};
