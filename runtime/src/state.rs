//! Per-request state.
//!
//! A [`RequestState`] owns the sub-operations of one handle. Its phase is
//! derived, never stored:
//!
//! ```text
//! Created ──issue──> InFlight ──every sub-operation terminal──> Complete
//!    ^                                                             │
//!    └──────────────────────────── issue again ────────────────────┘
//! ```
//!
//! A request with no sub-operations is never complete, so registering a
//! handle and issuing later cannot race the reaper.

use crate::dispatch::{BatchTracker, Destination, Dispatcher, SubOperationListener, SubOperationSlot};
use crate::metrics::SubOperationMetrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tickwire_core::{
    Callbacks, Handle, Persistence, RequestError, RequestInfo, RequestKind, SubOperationId,
    Transport, TransportRequest, Verb,
};

/// Lifecycle phase of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// Registered, nothing issued yet
    Created,
    /// At least one sub-operation has not reached its terminal event
    InFlight,
    /// Every sub-operation is terminal; reaped on the next tick
    Complete,
}

/// One network call the manager is about to issue.
#[derive(Debug)]
pub(crate) struct PlannedOperation {
    pub(crate) request: TransportRequest,
    pub(crate) destination: Destination,
}

impl PlannedOperation {
    pub(crate) const fn memory(request: TransportRequest) -> Self {
        Self {
            request,
            destination: Destination::Memory,
        }
    }

    pub(crate) const fn file(request: TransportRequest, path: std::path::PathBuf) -> Self {
        Self {
            request,
            destination: Destination::File(path),
        }
    }
}

/// Sub-operations issued by one verb call.
#[derive(Debug)]
pub(crate) struct Plan {
    pub(crate) batch: bool,
    pub(crate) operations: Vec<PlannedOperation>,
}

impl Plan {
    pub(crate) fn single(operation: PlannedOperation) -> Self {
        Self {
            batch: false,
            operations: vec![operation],
        }
    }

    pub(crate) const fn batch(operations: Vec<PlannedOperation>) -> Self {
        Self {
            batch: true,
            operations,
        }
    }
}

/// Collaborators needed to issue sub-operations.
pub(crate) struct IssueContext<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) dispatcher: &'a Dispatcher,
    pub(crate) persistence: &'a Arc<dyn Persistence>,
    pub(crate) ids: &'a AtomicU64,
}

#[derive(Debug)]
struct SubOperation {
    id: SubOperationId,
    verb: Verb,
    url: String,
    slot: Arc<SubOperationSlot>,
}

/// State of one tracked request.
#[derive(Debug)]
pub struct RequestState {
    handle: Handle,
    kind: RequestKind,
    callbacks: Callbacks,
    sub_operations: Vec<SubOperation>,
    batch: Arc<BatchTracker>,
    paused: bool,
    synchronous: bool,
    registered_at: DateTime<Utc>,
}

impl RequestState {
    pub(crate) fn new(handle: Handle, kind: RequestKind, callbacks: Callbacks) -> Self {
        Self {
            handle,
            kind,
            callbacks,
            sub_operations: Vec::new(),
            batch: Arc::new(BatchTracker::default()),
            paused: false,
            synchronous: false,
            registered_at: Utc::now(),
        }
    }

    /// Handle of this request.
    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Kind chosen at registration.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.sub_operations.is_empty() {
            Phase::Created
        } else if self.is_complete() {
            Phase::Complete
        } else {
            Phase::InFlight
        }
    }

    /// `true` iff at least one sub-operation exists and all of them are terminal.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.sub_operations.is_empty() && self.sub_operations.iter().all(|s| s.slot.is_terminal())
    }

    /// Whether this request is individually suspended.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the next issue blocks until its sub-operations finish.
    #[must_use]
    pub const fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    pub(crate) const fn set_synchronous(&mut self, synchronous: bool) {
        self.synchronous = synchronous;
    }

    /// Target URLs of the tracked sub-operations.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.sub_operations.iter().map(|s| s.url.clone()).collect()
    }

    /// Number of sub-operations that have not delivered their terminal event.
    #[must_use]
    pub fn live_sub_operations(&self) -> usize {
        self.sub_operations
            .iter()
            .filter(|s| !s.slot.is_terminal())
            .count()
    }

    /// When the request was registered.
    #[must_use]
    pub const fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Point-in-time copy for callers outside the registry lock.
    #[must_use]
    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            handle: self.handle.clone(),
            kind: self.kind,
            phase: self.phase(),
            verbs: self.sub_operations.iter().map(|s| s.verb).collect(),
            urls: self.urls(),
            live_sub_operations: self.live_sub_operations(),
            paused: self.paused,
            synchronous: self.synchronous,
            registered_at: self.registered_at,
        }
    }

    /// Hand the planned operations to the transport.
    ///
    /// Sub-operations that already finished are dropped first, so issuing on
    /// a completed request starts a new round with the same callbacks.
    pub(crate) fn issue(
        &mut self,
        ctx: &IssueContext<'_>,
        plan: Plan,
    ) -> Result<Vec<SubOperationId>, RequestError> {
        if plan.batch && !self.kind.allows_batch() {
            tracing::warn!(handle = %self.handle, kind = %self.kind, "Batch operation rejected");
            return Err(RequestError::KindMismatch(self.handle.clone()));
        }
        if plan.operations.is_empty() {
            tracing::warn!(handle = %self.handle, "Batch operation with no URLs rejected");
            return Err(RequestError::EmptyBatch(self.handle.clone()));
        }

        self.sub_operations.retain(|s| !s.slot.is_terminal());
        self.batch.begin(plan.operations.len());

        let mut ids = Vec::with_capacity(plan.operations.len());
        for planned in plan.operations {
            let id = SubOperationId::new(ctx.ids.fetch_add(1, Ordering::Relaxed));
            let slot = Arc::new(SubOperationSlot::default());
            let verb = planned.request.verb;
            let url = planned.request.url.clone();
            let listener = Arc::new(SubOperationListener {
                info: RequestInfo {
                    handle: self.handle.clone(),
                    sub_operation: id,
                    verb,
                    url: url.clone(),
                },
                kind: self.kind,
                callbacks: self.callbacks.clone(),
                slot: Arc::clone(&slot),
                batch: Arc::clone(&self.batch),
                destination: planned.destination,
                persistence: Arc::clone(ctx.persistence),
                dispatcher: ctx.dispatcher.clone(),
            });

            tracing::debug!(handle = %self.handle, sub_operation = %id, verb = %verb, url = %url, "Issuing sub-operation");
            ctx.transport.issue(id, planned.request, listener);
            if self.paused {
                ctx.transport.suspend(id);
            }
            self.sub_operations.push(SubOperation { id, verb, url, slot });
            ids.push(id);
        }

        SubOperationMetrics::record_issued(ids.len());
        Ok(ids)
    }

    /// Cancel every live sub-operation.
    ///
    /// Succeeds trivially when nothing is live.
    pub(crate) fn cancel(&self, transport: &dyn Transport) -> Result<(), RequestError> {
        let live: Vec<SubOperationId> = self
            .sub_operations
            .iter()
            .filter(|s| !s.slot.is_terminal())
            .map(|s| s.id)
            .collect();
        let total = live.len();
        let failed = live.into_iter().filter(|id| !transport.cancel(*id)).count();
        SubOperationMetrics::record_cancel(total);

        if failed == 0 {
            tracing::debug!(handle = %self.handle, cancelled = total, "Request cancelled");
            Ok(())
        } else {
            tracing::warn!(handle = %self.handle, failed, total, "Some sub-operations refused to cancel");
            Err(RequestError::PartialCancel { failed, total })
        }
    }

    pub(crate) fn suspend(&mut self, transport: &dyn Transport) -> Result<(), RequestError> {
        self.paused = true;
        self.apply_pause(|id| transport.suspend(id))
    }

    pub(crate) fn resume(&mut self, transport: &dyn Transport) -> Result<(), RequestError> {
        self.paused = false;
        self.apply_pause(|id| transport.resume(id))
    }

    fn apply_pause(&self, op: impl Fn(SubOperationId) -> bool) -> Result<(), RequestError> {
        let live: Vec<SubOperationId> = self
            .sub_operations
            .iter()
            .filter(|s| !s.slot.is_terminal())
            .map(|s| s.id)
            .collect();
        let total = live.len();
        let failed = live.into_iter().filter(|id| !op(*id)).count();
        if failed == 0 {
            Ok(())
        } else {
            tracing::warn!(handle = %self.handle, failed, total, "Some sub-operations refused to suspend or resume");
            Err(RequestError::PartialSuspend { failed, total })
        }
    }
}

/// Read-only view of a request, returned by lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSnapshot {
    /// Handle of the request
    pub handle: Handle,
    /// Kind chosen at registration
    pub kind: RequestKind,
    /// Phase at the time of the lookup
    pub phase: Phase,
    /// Verb of each tracked sub-operation
    pub verbs: Vec<Verb>,
    /// URL of each tracked sub-operation
    pub urls: Vec<String>,
    /// Sub-operations still running
    pub live_sub_operations: usize,
    /// Individually suspended
    pub paused: bool,
    /// Next issue blocks
    pub synchronous: bool,
    /// Registration time
    pub registered_at: DateTime<Utc>,
}
