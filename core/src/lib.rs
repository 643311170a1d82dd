//! # Tickwire Core
//!
//! Core types and collaborator traits for the Tickwire request lifecycle manager.
//!
//! Tickwire tracks logical HTTP requests (a single URL or a batch of URLs)
//! under opaque handles, drives them forward on a periodic tick and reports
//! their progress through user callbacks. This crate holds everything the
//! runtime and its collaborators share; it performs no I/O of its own.
//!
//! ## Core Concepts
//!
//! - **Handle**: opaque, never-reused identifier of a tracked request
//! - **Request kind**: `Single` (one sub-operation) or `Multiple` (a batch)
//! - **Sub-operation**: one transport-level network call
//! - **Callbacks**: header, progress, completion and aggregate completion
//! - **Transport**: the polled HTTP stack that performs sub-operations
//! - **Persistence**: local storage for downloads and file uploads
//!
//! ## Example
//!
//! ```
//! use tickwire_core::{Callbacks, RequestKind, TransportRequest, Verb};
//!
//! let request = TransportRequest::new(Verb::Get, "http://example.com/a.bin");
//! let callbacks = Callbacks::new().on_complete(|c| println!("done: {}", c.succeeded()));
//! assert_eq!(request.verb, Verb::Get);
//! assert!(!RequestKind::Single.allows_batch());
//! # let _ = callbacks;
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Callback set and completion reports
pub mod callbacks;

/// Error types
pub mod error;

/// Handles and handle generation
pub mod handle;

/// Local storage collaborator
pub mod persistence;

/// Request kinds and upload payloads
pub mod request;

/// Transport collaborator interface
pub mod transport;

/// HTTP verbs
pub mod verb;

pub use callbacks::{Callbacks, Completion, RequestInfo, ResponseContent};
pub use error::{PersistenceError, RequestError, RequestFailure};
pub use handle::{Handle, HandleGenerator, UuidHandleGenerator};
pub use persistence::Persistence;
pub use request::{Payload, RequestKind};
pub use transport::{
    Headers, Progress, ResponseHead, SubOperationId, Transport, TransportError, TransportEvent,
    TransportListener, TransportRequest, TransportResponse,
};
pub use verb::Verb;
