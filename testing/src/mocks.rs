//! Scripted transport for deterministic tests.
//!
//! [`MockTransport`] performs no I/O. Every sub-operation follows the
//! [`MockResponse`] scripted for its URL and advances one step per
//! [`Transport::drive`] call:
//!
//! - first drive: `HeadersReceived` (successful responses only)
//! - every drive: `Progress`, with the body revealed proportionally
//! - drive number `n` (see [`MockResponse::after_ticks`]): `Completed`
//!
//! A cancelled sub-operation reports `Completed(Err(Cancelled))` on the next
//! drive. Events are delivered after the internal lock is released, so
//! listeners may call back into the transport.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tickwire_core::{
    Progress, ResponseHead, SubOperationId, Transport, TransportError, TransportEvent,
    TransportListener, TransportRequest, TransportResponse,
};

/// Scripted outcome of a sub-operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    head: ResponseHead,
    body: Vec<u8>,
    failure: Option<TransportError>,
    ticks: u32,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self::ok(Vec::new())
    }
}

impl MockResponse {
    /// `200` with `body`, completing on the first drive.
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            head: ResponseHead::new(200),
            body: body.into(),
            failure: None,
            ticks: 1,
        }
    }

    /// Response with `status` and an empty body.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            head: ResponseHead::new(status),
            ..Self::ok(Vec::new())
        }
    }

    /// Transport failure instead of a response.
    #[must_use]
    pub fn failure(error: TransportError) -> Self {
        Self {
            failure: Some(error),
            ..Self::ok(Vec::new())
        }
    }

    /// Complete on drive number `ticks` (at least 1).
    #[must_use]
    pub fn after_ticks(mut self, ticks: u32) -> Self {
        self.ticks = ticks.max(1);
        self
    }

    /// Add a response header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.head.headers.push((name.into(), value.into()));
        self
    }

    fn outcome(&self) -> Result<TransportResponse, TransportError> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(TransportResponse {
                head: self.head.clone(),
                body: self.body.clone(),
            }),
        }
    }

    fn progress(&self, request: &TransportRequest, elapsed: u32) -> Progress {
        let total = self.body.len() as u64;
        Progress {
            bytes_sent: request.body.len() as u64,
            bytes_received: total * u64::from(elapsed.min(self.ticks)) / u64::from(self.ticks),
            total: Some(total),
        }
    }
}

struct MockOp {
    request: TransportRequest,
    response: MockResponse,
    listener: Arc<dyn TransportListener>,
    elapsed: u32,
    headers_sent: bool,
    suspended: bool,
    cancelled: bool,
}

impl MockOp {
    /// Events for one drive step, and whether the op is finished.
    fn step(&mut self) -> (Vec<TransportEvent>, bool) {
        if self.cancelled {
            return (
                vec![TransportEvent::Completed(Err(TransportError::Cancelled))],
                true,
            );
        }

        let mut events = Vec::new();
        self.elapsed += 1;
        if self.response.failure.is_none() {
            if !self.headers_sent {
                self.headers_sent = true;
                events.push(TransportEvent::HeadersReceived(self.response.head.clone()));
            }
            events.push(TransportEvent::Progress(
                self.response.progress(&self.request, self.elapsed),
            ));
        }

        let finished = self.elapsed >= self.response.ticks;
        if finished {
            events.push(TransportEvent::Completed(self.response.outcome()));
        }
        (events, finished)
    }

    /// Every remaining event up to and including completion.
    fn run_to_end(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        loop {
            let (step, finished) = self.step();
            events.extend(step);
            if finished {
                return events;
            }
        }
    }
}

#[derive(Default)]
struct Inner {
    scripted: HashMap<String, MockResponse>,
    refuse_cancel: HashSet<String>,
    ops: BTreeMap<SubOperationId, MockOp>,
    issued: Vec<TransportRequest>,
    drives: usize,
}

/// In-memory [`Transport`] following scripted responses.
///
/// # Example
///
/// ```
/// use tickwire_testing::{MockResponse, MockTransport};
///
/// let transport = MockTransport::new();
/// transport.respond("http://test/a.json", MockResponse::ok(b"{}".to_vec()).after_ticks(2));
/// assert!(transport.issued().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    /// Transport where unscripted URLs answer `200` with an empty body on the
    /// first drive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the response for every sub-operation targeting `url`.
    pub fn respond(&self, url: impl Into<String>, response: MockResponse) {
        self.inner
            .lock()
            .unwrap()
            .scripted
            .insert(url.into(), response);
    }

    /// Make `cancel` refuse sub-operations targeting `url`.
    pub fn refuse_cancel(&self, url: impl Into<String>) {
        self.inner.lock().unwrap().refuse_cancel.insert(url.into());
    }

    /// Every request issued so far, in order.
    #[must_use]
    pub fn issued(&self) -> Vec<TransportRequest> {
        self.inner.lock().unwrap().issued.clone()
    }

    /// Number of `drive` calls so far.
    #[must_use]
    pub fn drives(&self) -> usize {
        self.inner.lock().unwrap().drives
    }

    /// Sub-operations that have not delivered their terminal event.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.lock().unwrap().ops.len()
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("MockTransport")
            .field("scripted", &inner.scripted.len())
            .field("in_flight", &inner.ops.len())
            .field("issued", &inner.issued.len())
            .field("drives", &inner.drives)
            .finish()
    }
}

fn deliver(pending: Vec<(Arc<dyn TransportListener>, TransportEvent)>) {
    for (listener, event) in pending {
        listener.on_event(event);
    }
}

impl Transport for MockTransport {
    fn drive(&self, _delta: Duration) {
        let mut pending = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.drives += 1;

            let mut finished = Vec::new();
            for (id, op) in &mut inner.ops {
                if op.suspended && !op.cancelled {
                    continue;
                }
                let (events, done) = op.step();
                pending.extend(events.into_iter().map(|e| (Arc::clone(&op.listener), e)));
                if done {
                    finished.push(*id);
                }
            }
            for id in finished {
                inner.ops.remove(&id);
            }
        }
        deliver(pending);
    }

    fn issue(&self, id: SubOperationId, request: TransportRequest, listener: Arc<dyn TransportListener>) {
        let mut inner = self.inner.lock().unwrap();
        let response = inner
            .scripted
            .get(&request.url)
            .cloned()
            .unwrap_or_default();
        inner.issued.push(request.clone());
        inner.ops.insert(
            id,
            MockOp {
                request,
                response,
                listener,
                elapsed: 0,
                headers_sent: false,
                suspended: false,
                cancelled: false,
            },
        );
    }

    fn cancel(&self, id: SubOperationId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Inner {
            ops, refuse_cancel, ..
        } = &mut *inner;
        match ops.get_mut(&id) {
            Some(op) if !op.cancelled && !refuse_cancel.contains(&op.request.url) => {
                op.cancelled = true;
                true
            }
            _ => false,
        }
    }

    fn suspend(&self, id: SubOperationId) -> bool {
        match self.inner.lock().unwrap().ops.get_mut(&id) {
            Some(op) if !op.cancelled => {
                op.suspended = true;
                true
            }
            _ => false,
        }
    }

    fn resume(&self, id: SubOperationId) -> bool {
        match self.inner.lock().unwrap().ops.get_mut(&id) {
            Some(op) if !op.cancelled => {
                op.suspended = false;
                true
            }
            _ => false,
        }
    }

    fn wait(&self, id: SubOperationId) {
        let op = self.inner.lock().unwrap().ops.remove(&id);
        if let Some(mut op) = op {
            let listener = Arc::clone(&op.listener);
            let events = op.run_to_end();
            deliver(events.into_iter().map(|e| (Arc::clone(&listener), e)).collect());
        }
    }
}
