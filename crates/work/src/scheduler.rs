//! Fiber scheduler.
//!
//! A fixed pool of worker tasks pulls runnable fibers from a shared queue and
//! drives each one synchronously until it suspends, schedules a retry or
//! finishes. Suspended calls and retry delays run on detached tasks that
//! re-queue the fiber when they complete, so a worker is never held while a
//! remote call is outstanding.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use domop_core::OperatorConfig;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::action::{NextAction, Suspension};
use crate::call::{CallError, CALL_RESPONSE, FIBER_ERROR};
use crate::error::{Error, Result};
use crate::packet::{FiberId, Packet};
use crate::step::StepRef;

/// Scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of worker tasks.
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl From<&OperatorConfig> for SchedulerConfig {
    fn from(config: &OperatorConfig) -> Self {
        Self {
            workers: config.workers,
        }
    }
}

impl SchedulerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid_config("workers must be at least 1"));
        }
        Ok(())
    }
}

/// Final state of a fiber.
#[derive(Debug)]
pub struct FiberOutcome {
    /// Fiber id.
    pub fiber_id: FiberId,
    /// Packet as left by the last step.
    pub packet: Packet,
    /// Number of step applications.
    pub steps_executed: u64,
    /// Number of suspensions on remote calls.
    pub suspensions: u32,
    /// Number of scheduled retries.
    pub retries: u32,
    /// Wall time from submission to completion.
    pub elapsed: Duration,
}

impl FiberOutcome {
    /// The call error the fiber ended with, if any.
    pub fn error(&self) -> Option<&CallError> {
        self.packet.get::<CallError>(FIBER_ERROR)
    }

    /// Whether the fiber ended without a recorded call error.
    pub fn is_success(&self) -> bool {
        self.error().is_none()
    }
}

/// Handle to a submitted fiber.
#[derive(Debug)]
pub struct FiberHandle {
    fiber_id: FiberId,
    done: oneshot::Receiver<FiberOutcome>,
}

impl FiberHandle {
    /// Id of the fiber.
    pub const fn fiber_id(&self) -> FiberId {
        self.fiber_id
    }

    /// Wait for the fiber to finish.
    pub async fn join(self) -> Result<FiberOutcome> {
        let fiber_id = self.fiber_id;
        self.done.await.map_err(|_| Error::fiber_lost(fiber_id))
    }
}

/// Point-in-time scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Fibers accepted by `submit`.
    pub fibers_submitted: u64,
    /// Fibers that reached `Done`.
    pub fibers_completed: u64,
    /// Step applications across all fibers.
    pub steps_executed: u64,
    /// Suspensions across all fibers.
    pub suspensions: u64,
    /// Retries across all fibers.
    pub retries: u64,
    /// Fibers currently parked on a call or a retry delay.
    pub parked: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    steps: AtomicU64,
    suspensions: AtomicU64,
    retries: AtomicU64,
    parked: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            fibers_submitted: self.submitted.load(Ordering::Relaxed),
            fibers_completed: self.completed.load(Ordering::Relaxed),
            steps_executed: self.steps.load(Ordering::Relaxed),
            suspensions: self.suspensions.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            parked: self.parked.load(Ordering::Relaxed),
        }
    }
}

/// Per-fiber bookkeeping that travels with the fiber through the queue.
struct FiberState {
    done: oneshot::Sender<FiberOutcome>,
    started: Instant,
    steps: u64,
    suspensions: u32,
    retries: u32,
}

struct Runnable {
    step: StepRef,
    packet: Packet,
    state: FiberState,
}

struct Shared {
    queue: mpsc::UnboundedSender<Runnable>,
    counters: Counters,
}

impl Shared {
    fn enqueue(&self, runnable: Runnable) -> Result<()> {
        self.queue.send(runnable).map_err(|_| Error::SchedulerStopped)
    }

    fn requeue(&self, runnable: Runnable) {
        let fiber_id = runnable.packet.fiber_id();
        if self.enqueue(runnable).is_err() {
            warn!(fiber_id = %fiber_id, "Scheduler stopped, dropping fiber");
        }
    }
}

/// Runs step chains as fibers on a fixed worker pool.
pub struct FiberScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl FiberScheduler {
    /// Start the worker pool. Must be called within a tokio runtime.
    pub fn start(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            queue: tx,
            counters: Counters::default(),
        });
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.workers)
            .map(|worker| {
                let shared = Arc::clone(&shared);
                let rx = Arc::clone(&rx);
                tokio::spawn(worker_loop(worker, rx, shared))
            })
            .collect();

        info!(workers = config.workers, "Fiber scheduler started");
        Ok(Self { shared, workers })
    }

    /// Submit a fiber that starts at `step` with `packet`.
    pub fn submit(&self, step: StepRef, packet: Packet) -> Result<FiberHandle> {
        let fiber_id = packet.fiber_id();
        let (done, rx) = oneshot::channel();
        let state = FiberState {
            done,
            started: Instant::now(),
            steps: 0,
            suspensions: 0,
            retries: 0,
        };

        self.shared.enqueue(Runnable {
            step,
            packet,
            state,
        })?;
        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(fiber_id = %fiber_id, "Fiber submitted");

        Ok(FiberHandle { fiber_id, done: rx })
    }

    /// Submit a fiber and wait for it to finish.
    pub async fn run(&self, step: StepRef, packet: Packet) -> Result<FiberOutcome> {
        self.submit(step, packet)?.join().await
    }

    /// Current counters.
    pub fn stats(&self) -> SchedulerStats {
        self.shared.counters.snapshot()
    }

    /// Number of worker tasks.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop all workers. Fibers still queued or parked are dropped and their
    /// handles report [`Error::FiberLost`].
    pub fn shutdown(mut self) {
        self.abort_workers();
        info!("Fiber scheduler stopped");
    }

    fn abort_workers(&mut self) {
        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }
}

impl Drop for FiberScheduler {
    fn drop(&mut self) {
        self.abort_workers();
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Runnable>>>,
    shared: Arc<Shared>,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(runnable) = next else {
            debug!(worker, "Queue closed, worker exiting");
            break;
        };
        drive(&shared, runnable);
    }
}

/// Apply steps until the fiber leaves the worker.
fn drive(shared: &Arc<Shared>, runnable: Runnable) {
    let Runnable {
        mut step,
        mut packet,
        mut state,
    } = runnable;
    let fiber_id = packet.fiber_id();
    let span = info_span!("fiber", fiber_id = %fiber_id);
    let _entered = span.enter();

    loop {
        state.steps += 1;
        shared.counters.steps.fetch_add(1, Ordering::Relaxed);

        let current = step;
        let applied = catch_unwind(AssertUnwindSafe(|| current.apply(packet)));
        let action = match applied {
            Ok(action) => action,
            Err(_) => {
                error!(fiber_id = %fiber_id, step = current.name(), "Step panicked, fiber lost");
                return;
            }
        };

        match action {
            NextAction::Continue {
                step: next,
                packet: next_packet,
            } => {
                step = next;
                packet = next_packet;
            }
            NextAction::Suspend(suspension) => {
                state.suspensions += 1;
                shared.counters.suspensions.fetch_add(1, Ordering::Relaxed);
                park_on_call(shared, suspension, state);
                return;
            }
            NextAction::Retry {
                delay,
                step: retry,
                packet: retry_packet,
            } => {
                state.retries += 1;
                shared.counters.retries.fetch_add(1, Ordering::Relaxed);
                park_for_retry(shared, delay, retry, retry_packet, state);
                return;
            }
            NextAction::Done(done) => {
                complete(shared, done, state);
                return;
            }
        }
    }
}

fn park_on_call(shared: &Arc<Shared>, suspension: Suspension, state: FiberState) {
    let Suspension {
        packet,
        on_resume,
        call,
        call_name,
    } = suspension;
    let span = info_span!("call", fiber_id = %packet.fiber_id(), call = %call_name);
    let shared = Arc::clone(shared);
    shared.counters.parked.fetch_add(1, Ordering::Relaxed);

    tokio::spawn(
        async move {
            let response = call.await;
            shared.counters.parked.fetch_sub(1, Ordering::Relaxed);
            debug!("Call completed, resuming fiber");

            let mut packet = packet;
            packet.insert_boxed(CALL_RESPONSE, response);
            shared.requeue(Runnable {
                step: on_resume,
                packet,
                state,
            });
        }
        .instrument(span),
    );
}

fn park_for_retry(
    shared: &Arc<Shared>,
    delay: Duration,
    step: StepRef,
    packet: Packet,
    state: FiberState,
) {
    let span = info_span!("retry", fiber_id = %packet.fiber_id(), step = step.name());
    let shared = Arc::clone(shared);
    shared.counters.parked.fetch_add(1, Ordering::Relaxed);

    tokio::spawn(
        async move {
            tokio::time::sleep(delay).await;
            shared.counters.parked.fetch_sub(1, Ordering::Relaxed);
            shared.requeue(Runnable {
                step,
                packet,
                state,
            });
        }
        .instrument(span),
    );
}

fn complete(shared: &Shared, packet: Packet, state: FiberState) {
    shared.counters.completed.fetch_add(1, Ordering::Relaxed);
    let fiber_id = packet.fiber_id();
    let outcome = FiberOutcome {
        fiber_id,
        packet,
        steps_executed: state.steps,
        suspensions: state.suspensions,
        retries: state.retries,
        elapsed: state.started.elapsed(),
    };

    match outcome.error() {
        Some(error) => warn!(fiber_id = %fiber_id, error = %error, "Fiber finished with error"),
        None => debug!(fiber_id = %fiber_id, steps = outcome.steps_executed, "Fiber finished"),
    }

    if state.done.send(outcome).is_err() {
        debug!(fiber_id = %fiber_id, "Fiber handle dropped before completion");
    }
}
