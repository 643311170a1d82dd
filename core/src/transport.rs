//! Transport collaborator interface.
//!
//! The manager never talks to the network itself. It hands
//! [`TransportRequest`]s to a [`Transport`] and observes what happens to them
//! through a [`TransportListener`] attached to each sub-operation.
//!
//! # Polling contract
//!
//! Events are only delivered from inside [`Transport::drive`] or
//! [`Transport::wait`]. A transport that is never driven makes no visible
//! progress, which is what lets the manager pause every in-flight request by
//! simply skipping the drive step of its tick.
//!
//! For every issued sub-operation the transport delivers, in order:
//!
//! 1. at most one [`TransportEvent::HeadersReceived`]
//! 2. zero or more [`TransportEvent::Progress`]
//! 3. exactly one [`TransportEvent::Completed`], also after a cancel

use crate::verb::Verb;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Name/value header pairs in arrival order.
pub type Headers = Vec<(String, String)>;

/// Identifier of one transport-level operation.
///
/// Allocated by the manager before the operation is issued so listeners
/// know which sub-operation they belong to before the first event arrives.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubOperationId(u64);

impl SubOperationId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw id value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubOperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One network call as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// HTTP verb
    pub verb: Verb,
    /// Target URL
    pub url: String,
    /// Extra request headers
    pub headers: Headers,
    /// Request body (empty for none)
    pub body: Vec<u8>,
}

impl TransportRequest {
    /// Create a request with no headers and an empty body.
    #[must_use]
    pub fn new(verb: Verb, url: impl Into<String>) -> Self {
        Self {
            verb,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace all headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseHead {
    /// HTTP status code as reported by the transport
    pub status: u16,
    /// Response headers
    pub headers: Headers,
}

impl ResponseHead {
    /// Create a head with no headers.
    #[must_use]
    pub const fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    /// First header value matching `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transfer counters reported while a sub-operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Request body bytes sent so far
    pub bytes_sent: u64,
    /// Response body bytes received so far
    pub bytes_received: u64,
    /// Expected response size, when the server announced one
    pub total: Option<u64>,
}

/// A finished response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportResponse {
    /// Status and headers
    pub head: ResponseHead,
    /// Complete body
    pub body: Vec<u8>,
}

/// Transport-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The sub-operation was cancelled before it finished
    #[error("Request cancelled")]
    Cancelled,

    /// Could not reach the server
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The transport gave up waiting
    #[error("Request timed out")]
    Timeout,

    /// The request could not be built (bad URL, bad header)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The transfer broke off mid-way
    #[error("Transfer failed: {0}")]
    Transfer(String),
}

/// Something that happened to a sub-operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Status line and headers arrived
    HeadersReceived(ResponseHead),
    /// Bytes moved
    Progress(Progress),
    /// Terminal event, success or failure
    Completed(Result<TransportResponse, TransportError>),
}

impl TransportEvent {
    /// Whether this is the terminal event of a sub-operation.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Receives the events of one sub-operation.
pub trait TransportListener: Send + Sync {
    /// Called by the transport from `drive` or `wait`.
    fn on_event(&self, event: TransportEvent);
}

/// The HTTP stack the manager drives.
///
/// Implementations must be non-blocking in [`drive`](Transport::drive): the
/// manager calls it while holding the registry lock.
pub trait Transport: Send + Sync {
    /// Advance every in-flight operation by one step and deliver pending events.
    fn drive(&self, delta: Duration);

    /// Start a network operation. Events go to `listener`.
    fn issue(&self, id: SubOperationId, request: TransportRequest, listener: Arc<dyn TransportListener>);

    /// Abort an operation.
    ///
    /// Returns `false` if the operation is unknown or already finished. A
    /// cancelled operation still delivers a `Completed(Err(Cancelled))`.
    fn cancel(&self, id: SubOperationId) -> bool;

    /// Stop delivering events for an operation until resumed.
    fn suspend(&self, id: SubOperationId) -> bool;

    /// Undo [`suspend`](Transport::suspend).
    fn resume(&self, id: SubOperationId) -> bool;

    /// Block the calling thread until the operation has delivered its
    /// terminal event. Returns immediately for unknown operations.
    fn wait(&self, id: SubOperationId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let head = ResponseHead {
            status: 200,
            headers: vec![("Content-Length".to_string(), "42".to_string())],
        };
        assert_eq!(head.header("content-length"), Some("42"));
        assert_eq!(head.header("etag"), None);
    }

    #[test]
    fn test_request_builder() {
        let request = TransportRequest::new(Verb::Put, "http://x/a.bin")
            .with_header("Content-Type", "application/octet-stream")
            .with_body(vec![1, 2, 3]);
        assert_eq!(request.verb, Verb::Put);
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.body, vec![1, 2, 3]);
    }

    #[test]
    fn test_only_completed_is_terminal() {
        assert!(!TransportEvent::HeadersReceived(ResponseHead::new(200)).is_terminal());
        assert!(!TransportEvent::Progress(Progress::default()).is_terminal());
        assert!(TransportEvent::Completed(Err(TransportError::Cancelled)).is_terminal());
    }

    #[test]
    fn test_sub_operation_id_display() {
        assert_eq!(SubOperationId::new(7).to_string(), "sub-7");
    }
}
