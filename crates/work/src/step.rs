//! Steps and chain construction.
//!
//! A chain is an immutable forward list: every step receives its successor
//! when it is built and never changes it afterwards, so chains are assembled
//! back to front and cannot contain cycles.

use std::sync::Arc;

use crate::action::NextAction;
use crate::packet::Packet;

/// A processing unit in a chain.
///
/// `apply` must not block. Remote work is handed to the scheduler by
/// returning [`NextAction::Suspend`].
pub trait Step: Send + Sync {
    /// Step name (for logging/debugging).
    fn name(&self) -> &str;

    /// Process the packet and decide what happens next.
    fn apply(&self, packet: Packet) -> NextAction;
}

/// Shared reference to a step.
pub type StepRef = Arc<dyn Step>;

/// Continue with `next`, or finish the fiber at the end of the chain.
pub fn do_next(next: Option<&StepRef>, packet: Packet) -> NextAction {
    match next {
        Some(step) => NextAction::Continue {
            step: Arc::clone(step),
            packet,
        },
        None => NextAction::Done(packet),
    }
}

type StepFn = dyn Fn(Packet, Option<&StepRef>) -> NextAction + Send + Sync;

/// A step backed by a closure.
pub struct FnStep {
    name: String,
    next: Option<StepRef>,
    func: Box<StepFn>,
}

impl FnStep {
    /// Create a step whose closure decides the next action itself.
    pub fn new<F>(name: impl Into<String>, next: Option<StepRef>, func: F) -> Self
    where
        F: Fn(Packet, Option<&StepRef>) -> NextAction + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            next,
            func: Box::new(func),
        }
    }

    /// Create a step that mutates the packet and then continues.
    pub fn effect<F>(name: impl Into<String>, next: Option<StepRef>, effect: F) -> Self
    where
        F: Fn(&mut Packet) + Send + Sync + 'static,
    {
        Self::new(name, next, move |mut packet, next| {
            effect(&mut packet);
            do_next(next, packet)
        })
    }

    /// Wrap into a [`StepRef`].
    pub fn into_ref(self) -> StepRef {
        Arc::new(self)
    }
}

impl Step for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, packet: Packet) -> NextAction {
        (self.func)(packet, self.next.as_ref())
    }
}

type Link = Box<dyn FnOnce(Option<StepRef>) -> StepRef + Send>;

/// Builder that links steps front to back and constructs them back to front.
///
/// ```ignore
/// let chain = Chain::new()
///     .then(|next| FnStep::effect("load", next, load).into_ref())
///     .then(|next| reconciler.build_step_chain_with_next(inputs, conflict, next))
///     .build();
/// ```
#[derive(Default)]
pub struct Chain {
    links: Vec<Link>,
}

impl Chain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step constructor. It receives the step that follows it.
    #[must_use]
    pub fn then<F>(mut self, link: F) -> Self
    where
        F: FnOnce(Option<StepRef>) -> StepRef + Send + 'static,
    {
        self.links.push(Box::new(link));
        self
    }

    /// Number of links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no links were added.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Construct the chain. Returns `None` for an empty chain.
    pub fn build(self) -> Option<StepRef> {
        self.build_with_tail(None)
    }

    /// Construct the chain so that its last step continues with `tail`.
    pub fn build_with_tail(self, tail: Option<StepRef>) -> Option<StepRef> {
        self.links
            .into_iter()
            .rev()
            .fold(tail, |next, link| Some(link(next)))
    }
}
