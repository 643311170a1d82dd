//! `reqwest`-backed transport.
//!
//! Each sub-operation runs as a Tokio task that pushes its events into a
//! bounded channel. [`Transport::drive`] drains those channels without
//! blocking and hands the events to the listeners, which keeps every
//! callback on the ticking thread.
//!
//! Suspending a sub-operation stops draining its channel. Once the buffer is
//! full the task blocks on `send`, so the transfer itself stalls until the
//! sub-operation is resumed.

use crate::config::ManagerConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tickwire_core::{
    Progress, ResponseHead, SubOperationId, Transport, TransportError, TransportEvent,
    TransportListener, TransportRequest, TransportResponse,
};
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;

const DEFAULT_EVENT_BUFFER: usize = 32;

/// Errors from building the HTTP transport.
#[derive(Error, Debug)]
pub enum HttpTransportError {
    /// The HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

struct InFlight {
    events: Option<mpsc::Receiver<TransportEvent>>,
    listener: Arc<dyn TransportListener>,
    task: JoinHandle<()>,
    suspended: bool,
    cancelled: bool,
}

/// Transport performing real HTTP requests with `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    runtime: RuntimeHandle,
    event_buffer: usize,
    in_flight: Mutex<HashMap<SubOperationId, InFlight>>,
}

impl ReqwestTransport {
    /// Transport with a default client, spawning on `runtime`.
    #[must_use]
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self::with_client(runtime, reqwest::Client::new(), DEFAULT_EVENT_BUFFER)
    }

    /// Transport configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpTransportError::Client`] if the client cannot be built.
    pub fn from_config(
        runtime: RuntimeHandle,
        config: &ManagerConfig,
    ) -> Result<Self, HttpTransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(runtime, client, config.event_buffer))
    }

    /// Transport over an existing client.
    #[must_use]
    pub fn with_client(runtime: RuntimeHandle, client: reqwest::Client, event_buffer: usize) -> Self {
        Self {
            client,
            runtime,
            event_buffer: event_buffer.max(1),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Sub-operations that have not yet delivered their terminal event.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubOperationId, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("event_buffer", &self.event_buffer)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Transport for ReqwestTransport {
    fn drive(&self, _delta: Duration) {
        let mut in_flight = self.lock();
        let mut finished = Vec::new();

        for (id, op) in in_flight.iter_mut() {
            if op.suspended && !op.cancelled {
                continue;
            }
            // Taken by `wait`
            let Some(events) = op.events.as_mut() else {
                continue;
            };

            loop {
                match events.try_recv() {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        op.listener.on_event(event);
                        if terminal {
                            finished.push(*id);
                            break;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        op.listener
                            .on_event(TransportEvent::Completed(Err(TransportError::Cancelled)));
                        finished.push(*id);
                        break;
                    }
                }
            }
        }

        for id in finished {
            in_flight.remove(&id);
        }
        tracing::trace!(in_flight = in_flight.len(), "Drove HTTP transport");
    }

    fn issue(&self, id: SubOperationId, request: TransportRequest, listener: Arc<dyn TransportListener>) {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        tracing::trace!(sub_operation = %id, verb = %request.verb, url = %request.url, "Spawning HTTP task");
        let task = self.runtime.spawn(perform(self.client.clone(), request, tx));

        self.lock().insert(
            id,
            InFlight {
                events: Some(rx),
                listener,
                task,
                suspended: false,
                cancelled: false,
            },
        );
    }

    fn cancel(&self, id: SubOperationId) -> bool {
        let mut in_flight = self.lock();
        let Some(op) = in_flight.get_mut(&id) else {
            return false;
        };
        if op.cancelled || op.task.is_finished() {
            return false;
        }
        op.task.abort();
        op.cancelled = true;
        tracing::debug!(sub_operation = %id, "Aborted HTTP task");
        true
    }

    fn suspend(&self, id: SubOperationId) -> bool {
        match self.lock().get_mut(&id) {
            Some(op) if !op.cancelled => {
                op.suspended = true;
                true
            }
            _ => false,
        }
    }

    fn resume(&self, id: SubOperationId) -> bool {
        match self.lock().get_mut(&id) {
            Some(op) if !op.cancelled => {
                op.suspended = false;
                true
            }
            _ => false,
        }
    }

    fn wait(&self, id: SubOperationId) {
        let (mut events, listener) = {
            let mut in_flight = self.lock();
            let Some(op) = in_flight.get_mut(&id) else {
                return;
            };
            let Some(events) = op.events.take() else {
                return;
            };
            (events, Arc::clone(&op.listener))
        };

        loop {
            if let Some(event) = events.blocking_recv() {
                let terminal = event.is_terminal();
                listener.on_event(event);
                if terminal {
                    break;
                }
            } else {
                listener.on_event(TransportEvent::Completed(Err(TransportError::Cancelled)));
                break;
            }
        }

        self.lock().remove(&id);
    }
}

async fn perform(client: reqwest::Client, request: TransportRequest, tx: mpsc::Sender<TransportEvent>) {
    let result = run(client, request, &tx).await;
    // The receiver is gone only if the transport itself was dropped
    let _ = tx.send(TransportEvent::Completed(result)).await;
}

async fn run(
    client: reqwest::Client,
    request: TransportRequest,
    tx: &mpsc::Sender<TransportEvent>,
) -> Result<TransportResponse, TransportError> {
    let method = reqwest::Method::from_bytes(request.verb.as_str().as_bytes())
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
    let bytes_sent = request.body.len() as u64;

    let mut builder = client.request(method, request.url.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if !request.body.is_empty() {
        builder = builder.body(request.body);
    }

    let mut response = builder.send().await.map_err(map_error)?;
    let head = ResponseHead {
        status: response.status().as_u16(),
        headers: response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
    };
    let total = response.content_length();

    if tx.send(TransportEvent::HeadersReceived(head.clone())).await.is_err() {
        return Err(TransportError::Cancelled);
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(map_error)? {
        body.extend_from_slice(&chunk);
        let progress = Progress {
            bytes_sent,
            bytes_received: body.len() as u64,
            total,
        };
        if tx.send(TransportEvent::Progress(progress)).await.is_err() {
            return Err(TransportError::Cancelled);
        }
    }

    Ok(TransportResponse { head, body })
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Transfer(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Collect {
        events: Mutex<Vec<TransportEvent>>,
        done: AtomicBool,
    }

    impl TransportListener for Collect {
        fn on_event(&self, event: TransportEvent) {
            if event.is_terminal() {
                self.done.store(true, Ordering::SeqCst);
            }
            self.events.lock().unwrap().push(event);
        }
    }

    fn collector() -> Arc<Collect> {
        Arc::new(Collect {
            events: Mutex::new(Vec::new()),
            done: AtomicBool::new(false),
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalid_url_completes_with_error() {
        let transport = ReqwestTransport::new(RuntimeHandle::current());
        let listener = collector();

        transport.issue(
            SubOperationId::new(1),
            TransportRequest::new(tickwire_core::Verb::Get, "not a url"),
            Arc::clone(&listener) as Arc<dyn TransportListener>,
        );

        for _ in 0..200 {
            transport.drive(Duration::ZERO);
            if listener.done.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let events = listener.events.lock().unwrap();
        assert!(matches!(events.last(), Some(TransportEvent::Completed(Err(_)))));
        assert_eq!(transport.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_suspend_and_cancel_bookkeeping() {
        let transport = ReqwestTransport::new(RuntimeHandle::current());
        let listener = collector();
        let id = SubOperationId::new(7);

        // Accepts connections but never answers
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", silent.local_addr().unwrap());
        transport.issue(
            id,
            TransportRequest::new(tickwire_core::Verb::Get, url),
            Arc::clone(&listener) as Arc<dyn TransportListener>,
        );

        assert!(transport.suspend(id));
        assert!(transport.resume(id));
        assert!(transport.cancel(id));
        assert!(!transport.cancel(id));
        assert!(!transport.suspend(id));
        assert!(!transport.cancel(SubOperationId::new(99)));

        for _ in 0..200 {
            transport.drive(Duration::ZERO);
            if listener.done.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let events = listener.events.lock().unwrap();
        assert_eq!(
            events.last(),
            Some(&TransportEvent::Completed(Err(TransportError::Cancelled)))
        );
    }
}
