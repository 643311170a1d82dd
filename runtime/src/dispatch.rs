//! Deferred callback delivery.
//!
//! Transports report events while the registry lock is held, so user
//! callbacks cannot run at that point: a callback that calls back into the
//! manager would deadlock. Listeners instead turn every event into a job on
//! the [`Dispatcher`] queue, and the manager flushes the queue once the lock
//! has been released.
//!
//! Jobs run in the order they were enqueued. Within one sub-operation that
//! gives headers, then progress, then completion. The aggregate completion
//! of a batch is enqueued right after the last individual completion job, so
//! it always runs after every completion of its round.

use crate::metrics::{SubOperationMetrics, TickMetrics};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::thread::{self, ThreadId};
use tickwire_core::{
    Callbacks, Completion, Persistence, RequestFailure, RequestInfo, RequestKind, ResponseContent,
    TransportError, TransportEvent, TransportListener, TransportResponse,
};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// FIFO queue of callback invocations waiting for the registry lock to drop.
#[derive(Clone, Default)]
pub struct Dispatcher {
    queue: Arc<Mutex<VecDeque<Job>>>,
    flushing: Arc<Mutex<()>>,
    owner: Arc<Mutex<Option<ThreadId>>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job.
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Box::new(job));
    }

    /// Jobs waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run queued jobs until the queue is empty and return how many ran.
    ///
    /// Jobs enqueued while flushing (for example by a callback that issues a
    /// synchronous request) run in the same flush. A nested or concurrent
    /// call returns immediately and leaves the work to the flush already
    /// in progress. A panicking job is logged and skipped.
    pub fn flush(&self) -> usize {
        let mut ran = 0;
        loop {
            let guard = match self.flushing.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return ran,
            };
            ran += self.drain();
            drop(guard);
            // Jobs may have arrived between the last pop and the unlock
            if self.pending() == 0 {
                return ran;
            }
        }
    }

    /// Like [`flush`](Self::flush), but waits for a flush running on another
    /// thread to finish instead of returning early.
    ///
    /// On return every job queued before the call has run. Called from
    /// inside a job on the flushing thread it returns 0, and the outer flush
    /// runs the remaining jobs once the current one returns.
    pub fn flush_blocking(&self) -> usize {
        if self.is_flushing_thread() {
            return 0;
        }
        let mut ran = 0;
        loop {
            let guard = self
                .flushing
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            ran += self.drain();
            drop(guard);
            if self.pending() == 0 {
                return ran;
            }
        }
    }

    fn is_flushing_thread(&self) -> bool {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner)
            == Some(thread::current().id())
    }

    fn set_owner(&self, owner: Option<ThreadId>) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = owner;
    }

    /// Run jobs until the queue is empty. The caller holds `flushing`.
    fn drain(&self) -> usize {
        self.set_owner(Some(thread::current().id()));
        let mut ran = 0;
        loop {
            // The queue lock must not be held while the job runs
            let next = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(job) = next else { break };

            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                TickMetrics::record_callback_panic();
                tracing::error!("Callback panicked; continuing with remaining callbacks");
            }
            ran += 1;
        }
        self.set_owner(None);
        ran
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Terminal flag of one sub-operation, shared between the request state and
/// the transport listener.
#[derive(Debug, Default)]
pub(crate) struct SubOperationSlot {
    finished: AtomicBool,
}

impl SubOperationSlot {
    pub(crate) fn is_terminal(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Mark the slot terminal. Returns `false` if it already was.
    pub(crate) fn finish(&self) -> bool {
        self.finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Counts outstanding sub-operations of the current batch round.
#[derive(Debug, Default)]
pub(crate) struct BatchTracker {
    outstanding: AtomicUsize,
}

impl BatchTracker {
    pub(crate) fn begin(&self, count: usize) {
        self.outstanding.fetch_add(count, Ordering::AcqRel);
    }

    /// Record one finished sub-operation. Returns `true` for the last one.
    pub(crate) fn finish_one(&self) -> bool {
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok_and(|previous| previous == 1)
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

/// What happens to a successful response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Destination {
    /// Handed to the completion callback only
    Memory,
    /// Written to a local path first
    File(PathBuf),
}

/// Listener attached to one sub-operation.
pub(crate) struct SubOperationListener {
    pub(crate) info: RequestInfo,
    pub(crate) kind: RequestKind,
    pub(crate) callbacks: Callbacks,
    pub(crate) slot: Arc<SubOperationSlot>,
    pub(crate) batch: Arc<BatchTracker>,
    pub(crate) destination: Destination,
    pub(crate) persistence: Arc<dyn Persistence>,
    pub(crate) dispatcher: Dispatcher,
}

impl SubOperationListener {
    fn complete(&self, result: Result<TransportResponse, TransportError>) {
        if !self.slot.finish() {
            tracing::warn!(
                handle = %self.info.handle,
                sub_operation = %self.info.sub_operation,
                "Ignoring duplicate completion"
            );
            return;
        }

        SubOperationMetrics::record_completed(result.is_ok());
        match &result {
            Ok(response) => tracing::debug!(
                handle = %self.info.handle,
                sub_operation = %self.info.sub_operation,
                status = response.head.status,
                bytes = response.body.len(),
                "Sub-operation completed"
            ),
            Err(error) => tracing::debug!(
                handle = %self.info.handle,
                sub_operation = %self.info.sub_operation,
                error = %error,
                "Sub-operation failed"
            ),
        }

        let info = self.info.clone();
        let callback = self.callbacks.complete().cloned();
        let destination = self.destination.clone();
        let persistence = Arc::clone(&self.persistence);
        self.dispatcher.enqueue(move || {
            let result = resolve(result, destination, persistence.as_ref());
            if let Err(RequestFailure::Persistence(reason)) = &result {
                tracing::warn!(handle = %info.handle, url = %info.url, reason = %reason, "Failed to save response");
            }
            if let Some(callback) = callback {
                callback(&Completion { info, result });
            }
        });

        if self.batch.finish_one() && self.kind == RequestKind::Multiple {
            tracing::debug!(handle = %self.info.handle, "Batch complete");
            if let Some(callback) = self.callbacks.all_complete().cloned() {
                let handle = self.info.handle.clone();
                self.dispatcher.enqueue(move || callback(&handle));
            }
        }
    }
}

impl TransportListener for SubOperationListener {
    fn on_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::HeadersReceived(head) => {
                if self.slot.is_terminal() {
                    return;
                }
                if let Some(callback) = self.callbacks.header().cloned() {
                    let info = self.info.clone();
                    self.dispatcher.enqueue(move || callback(&info, &head));
                }
            }
            TransportEvent::Progress(progress) => {
                if self.slot.is_terminal() {
                    return;
                }
                if let Some(callback) = self.callbacks.progress().cloned() {
                    let info = self.info.clone();
                    self.dispatcher.enqueue(move || callback(&info, progress));
                }
            }
            TransportEvent::Completed(result) => self.complete(result),
        }
    }
}

fn resolve(
    result: Result<TransportResponse, TransportError>,
    destination: Destination,
    persistence: &dyn Persistence,
) -> Result<ResponseContent, RequestFailure> {
    let response = result?;
    let mut content = ResponseContent {
        status: response.head.status,
        headers: response.head.headers,
        body: response.body,
        saved_to: None,
    };
    if let Destination::File(path) = destination {
        persistence.save_bytes(&path, &content.body)?;
        content.saved_to = Some(path);
    }
    Ok(content)
}
