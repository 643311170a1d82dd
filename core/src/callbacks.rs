//! Callback set attached to a tracked request.
//!
//! A request carries one [`Callbacks`] value for its whole lifetime. Each
//! sub-operation reports, in order, headers (once), progress (zero or more
//! times) and a [`Completion`] (exactly once). Batch requests additionally
//! report an aggregate "all complete" signal after every individual
//! completion of the batch has been delivered.
//!
//! # Example
//!
//! ```
//! use tickwire_core::callbacks::Callbacks;
//!
//! let callbacks = Callbacks::new()
//!     .on_progress(|info, progress| {
//!         println!("{}: {} bytes", info.url, progress.bytes_received);
//!     })
//!     .on_complete(|completion| {
//!         println!("{} finished, ok = {}", completion.info.url, completion.succeeded());
//!     });
//! assert!(callbacks.has_on_complete());
//! ```

use crate::error::{PersistenceError, RequestFailure};
use crate::handle::Handle;
use crate::persistence::Persistence;
use crate::transport::{Headers, Progress, ResponseHead, SubOperationId};
use crate::verb::Verb;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifies the sub-operation an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Owning request
    pub handle: Handle,
    /// Transport-level operation
    pub sub_operation: SubOperationId,
    /// Verb issued
    pub verb: Verb,
    /// Target URL
    pub url: String,
}

/// Response handed to a completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseContent {
    /// HTTP status code, uninterpreted
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Response body
    pub body: Vec<u8>,
    /// Where the body was written, for downloads to a local path
    pub saved_to: Option<PathBuf>,
}

impl ResponseContent {
    /// Body bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// First header value matching `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Write the body to local storage.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the write fails.
    pub fn save(&self, persistence: &dyn Persistence, path: &Path) -> Result<(), PersistenceError> {
        persistence.save_bytes(path, &self.body)
    }
}

/// Terminal report of one sub-operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Which sub-operation finished
    pub info: RequestInfo,
    /// Response, or why there is none
    pub result: Result<ResponseContent, RequestFailure>,
}

impl Completion {
    /// Whether the transport produced a response (and it was saved, for downloads).
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    /// Response, if any.
    #[must_use]
    pub fn content(&self) -> Option<&ResponseContent> {
        self.result.as_ref().ok()
    }

    /// Status code, if a response arrived.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.content().map(|c| c.status)
    }
}

/// Called once when a sub-operation's headers arrive.
pub type HeaderCallback = Arc<dyn Fn(&RequestInfo, &ResponseHead) + Send + Sync>;
/// Called whenever a sub-operation moves bytes.
pub type ProgressCallback = Arc<dyn Fn(&RequestInfo, Progress) + Send + Sync>;
/// Called exactly once per sub-operation.
pub type CompleteCallback = Arc<dyn Fn(&Completion) + Send + Sync>;
/// Called once per batch round of a multiple-kind request.
pub type AllCompleteCallback = Arc<dyn Fn(&Handle) + Send + Sync>;

/// The four optional callbacks of a request.
#[derive(Clone, Default)]
pub struct Callbacks {
    header: Option<HeaderCallback>,
    progress: Option<ProgressCallback>,
    complete: Option<CompleteCallback>,
    all_complete: Option<AllCompleteCallback>,
}

impl Callbacks {
    /// Empty callback set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the header-received callback.
    #[must_use]
    pub fn on_header<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestInfo, &ResponseHead) + Send + Sync + 'static,
    {
        self.header = Some(Arc::new(f));
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestInfo, Progress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(f));
        self
    }

    /// Set the completion callback.
    #[must_use]
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&Completion) + Send + Sync + 'static,
    {
        self.complete = Some(Arc::new(f));
        self
    }

    /// Set the aggregate completion callback.
    #[must_use]
    pub fn on_all_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&Handle) + Send + Sync + 'static,
    {
        self.all_complete = Some(Arc::new(f));
        self
    }

    /// Header callback, if set.
    #[must_use]
    pub fn header(&self) -> Option<&HeaderCallback> {
        self.header.as_ref()
    }

    /// Progress callback, if set.
    #[must_use]
    pub fn progress(&self) -> Option<&ProgressCallback> {
        self.progress.as_ref()
    }

    /// Completion callback, if set.
    #[must_use]
    pub fn complete(&self) -> Option<&CompleteCallback> {
        self.complete.as_ref()
    }

    /// Aggregate completion callback, if set.
    #[must_use]
    pub fn all_complete(&self) -> Option<&AllCompleteCallback> {
        self.all_complete.as_ref()
    }

    /// Whether a completion callback is set.
    #[must_use]
    pub const fn has_on_complete(&self) -> bool {
        self.complete.is_some()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("header", &self.header.is_some())
            .field("progress", &self.progress.is_some())
            .field("complete", &self.complete.is_some())
            .field("all_complete", &self.all_complete.is_some())
            .finish()
    }
}
