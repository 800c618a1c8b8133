//! Shared state of one streaming invocation.
//!
//! The connector pushes into an [`EngineObserver`], the caller holds a
//! [`StreamCancelHandle`], and the engine's listener task drains the event
//! channel. All three see the same [`SessionShared`].
//!
//! The gate mutex decides, for every observer call and every cancellation,
//! whether the event is accepted. Accepted events are queued while the gate
//! is held, so the listener sees them in exactly the order the gate
//! accepted them, and a cancellation marker is always queued after every
//! record that was accepted before it.

use crate::{Error, Lifecycle, LifecycleState, Record, StreamCancellable, StreamObserver};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Why the engine stopped a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CancelReason {
    /// `stop()` on the caller's handle
    Caller,
    /// The configured stream timeout elapsed
    Timeout(u64),
    /// The collect target hit its record limit
    Overflow(usize),
    /// The forward target's receiver was dropped
    DownstreamClosed,
    /// The sink target's writer failed
    SinkFailed(String),
}

#[derive(Debug)]
pub(crate) enum StreamEvent {
    Record(Record),
    Error(Error),
    Complete,
    Cancelled(CancelReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Open,
    Terminated,
    Cancelled,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct SessionShared {
    execution_id: String,
    gate: Mutex<Gate>,
    events: mpsc::UnboundedSender<StreamEvent>,
    accepted: AtomicUsize,
    violations: AtomicUsize,
    finalized: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

impl SessionShared {
    pub(crate) fn new(
        execution_id: impl Into<String>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<StreamEvent>) {
        let execution_id = execution_id.into();
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Self {
            lifecycle: Mutex::new(Lifecycle::new(execution_id.clone())),
            execution_id,
            gate: Mutex::new(Gate::Open),
            events,
            accepted: AtomicUsize::new(0),
            violations: AtomicUsize::new(0),
            finalized: AtomicBool::new(false),
        });
        (shared, rx)
    }

    pub(crate) fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Cancel the stream if it is still open. Returns true if this call
    /// cancelled it.
    pub(crate) fn cancel(&self, reason: CancelReason) -> bool {
        let mut gate = lock(&self.gate);
        if *gate != Gate::Open {
            return false;
        }
        *gate = Gate::Cancelled;
        debug!(execution_id = %self.execution_id, reason = ?reason, "Stream cancellation requested");
        let _ = self.events.send(StreamEvent::Cancelled(reason));
        true
    }

    /// Mark the stream as over without queuing anything, e.g. when
    /// `start_stream` itself failed.
    pub(crate) fn mark_terminated(&self) {
        let mut gate = lock(&self.gate);
        if *gate == Gate::Open {
            *gate = Gate::Terminated;
        }
    }

    /// Single-trigger finalization gate. Exactly one caller gets `true`.
    pub(crate) fn begin_finalize(&self) -> bool {
        self.finalized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: Lifecycle) {
        *lock(&self.lifecycle) = lifecycle;
    }

    pub(crate) fn with_lifecycle<R>(&self, f: impl FnOnce(&mut Lifecycle) -> R) -> R {
        f(&mut lock(&self.lifecycle))
    }

    fn violation(&self, what: &str) {
        let total = self.violations.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            execution_id = %self.execution_id,
            violations = total,
            "Protocol violation: {} after the stream terminated, dropping it",
            what
        );
    }

    fn terminate(&self, event: StreamEvent, what: &str) {
        let mut gate = lock(&self.gate);
        match *gate {
            Gate::Open => {
                *gate = Gate::Terminated;
                let _ = self.events.send(event);
            }
            Gate::Cancelled => {
                debug!(execution_id = %self.execution_id, "Ignoring {} after cancellation", what);
            }
            Gate::Terminated => self.violation(what),
        }
    }
}

/// Observer handed to stream sources. Safe to call from any thread.
pub(crate) struct EngineObserver {
    shared: Arc<SessionShared>,
}

impl EngineObserver {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }
}

impl StreamObserver for EngineObserver {
    fn on_next(&self, record: Record) {
        let gate = lock(&self.shared.gate);
        match *gate {
            Gate::Open => {
                self.shared.accepted.fetch_add(1, Ordering::Relaxed);
                let _ = self.shared.events.send(StreamEvent::Record(record));
            }
            Gate::Cancelled => {
                debug!(execution_id = %self.shared.execution_id, "Discarding record delivered after cancellation");
            }
            Gate::Terminated => self.shared.violation("on_next"),
        }
    }

    fn on_error(&self, error: Error) {
        self.shared.terminate(StreamEvent::Error(error), "on_error");
    }

    fn on_complete(&self) {
        self.shared.terminate(StreamEvent::Complete, "on_complete");
    }
}

/// Caller-side control of a running stream.
///
/// Cloneable and usable from any thread. `stop()` takes effect on the
/// engine's bookkeeping immediately; the connector is asked to stop right
/// after.
#[derive(Clone)]
pub struct StreamCancelHandle {
    shared: Arc<SessionShared>,
}

impl StreamCancelHandle {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    /// Request cancellation. Idempotent; a no-op after termination.
    pub fn stop(&self) {
        self.shared.cancel(CancelReason::Caller);
    }

    pub fn execution_id(&self) -> &str {
        self.shared.execution_id()
    }

    pub fn is_cancelled(&self) -> bool {
        *lock(&self.shared.gate) == Gate::Cancelled
    }

    /// Current lifecycle state of the invocation
    pub fn state(&self) -> LifecycleState {
        self.shared.with_lifecycle(|l| l.state())
    }

    /// Records the observer let into the stream before termination or
    /// cancellation.
    ///
    /// This is what the result reports, except when the target itself cuts
    /// the stream short: the record that trips a collect limit, records
    /// queued behind a failed sink write, a closed forward receiver, or a
    /// forward receiver that stalled past the timeout are counted here but
    /// not in the result.
    pub fn records_accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::Relaxed)
    }

    /// Observer calls dropped because the stream had already terminated
    pub fn protocol_violations(&self) -> usize {
        self.shared.violations.load(Ordering::Relaxed)
    }
}

impl StreamCancellable for StreamCancelHandle {
    fn stop(&self) {
        StreamCancelHandle::stop(self)
    }
}
