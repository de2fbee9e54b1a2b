//! The value a step returns to the scheduler.

use std::any::Any;
use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::packet::Packet;
use crate::step::StepRef;

/// An outstanding remote call. Resolves to a boxed
/// [`CallResponse`](crate::CallResponse) of the call's result type.
pub type PendingCall = BoxFuture<'static, Box<dyn Any + Send>>;

/// A fiber parked on a remote call.
pub struct Suspension {
    /// The fiber's packet, handed back on resumption.
    pub packet: Packet,
    /// Step that receives the call response.
    pub on_resume: StepRef,
    /// The call itself.
    pub call: PendingCall,
    /// Name of the issuing call, for logging.
    pub call_name: String,
}

/// What the scheduler should do after a step.
pub enum NextAction {
    /// Run `step` next with `packet`.
    Continue { step: StepRef, packet: Packet },
    /// Park the fiber until the remote call completes, then resume.
    Suspend(Suspension),
    /// Run `step` again after `delay`.
    Retry {
        delay: Duration,
        step: StepRef,
        packet: Packet,
    },
    /// The fiber is finished.
    Done(Packet),
}

impl NextAction {
    /// Short label for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Continue { .. } => "continue",
            Self::Suspend(_) => "suspend",
            Self::Retry { .. } => "retry",
            Self::Done(_) => "done",
        }
    }

    /// Whether this action ends the fiber.
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Borrow the packet carried by the action.
    pub const fn packet(&self) -> &Packet {
        match self {
            Self::Continue { packet, .. } | Self::Retry { packet, .. } | Self::Done(packet) => {
                packet
            }
            Self::Suspend(suspension) => &suspension.packet,
        }
    }

    /// Name of the step this action targets, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Continue { step, .. } | Self::Retry { step, .. } => Some(step.name()),
            Self::Suspend(suspension) => Some(suspension.on_resume.name()),
            Self::Done(_) => None,
        }
    }
}

impl fmt::Debug for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("NextAction");
        out.field("kind", &self.kind());
        if let Some(target) = self.target() {
            out.field("target", &target);
        }
        if let Self::Retry { delay, .. } = self {
            out.field("delay", delay);
        }
        out.field("fiber_id", &self.packet().fiber_id()).finish()
    }
}
