//! Error types shared by the manager, its collaborators and callbacks.

use crate::handle::Handle;
use crate::transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by registry operations.
///
/// None of these are fatal: the manager logs them and hands them back to
/// the caller. Transport failures never appear here, they are reported
/// through the completion callback instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The handle is unknown or has already been reaped
    #[error("The handle was not found [{0}]")]
    HandleNotFound(Handle),

    /// A batch operation was issued against a single-kind request
    #[error("Batch operation issued against single request [{0}]")]
    KindMismatch(Handle),

    /// A batch operation was issued with no targets
    #[error("No URLs supplied for request [{0}]")]
    EmptyBatch(Handle),

    /// The upload source could not be read
    #[error("Could not read upload source: {0}")]
    Source(String),

    /// At least one sub-operation refused to cancel
    ///
    /// The caller must re-check individual requests rather than assume
    /// everything was rolled back.
    #[error("{failed} of {total} sub-operations could not be cancelled")]
    PartialCancel {
        /// Sub-operations that refused
        failed: usize,
        /// Sub-operations asked
        total: usize,
    },

    /// At least one sub-operation refused to suspend or resume
    #[error("{failed} of {total} sub-operations could not be suspended or resumed")]
    PartialSuspend {
        /// Sub-operations that refused
        failed: usize,
        /// Sub-operations asked
        total: usize,
    },

    /// Verb text not recognised
    #[error("Unsupported verb: {0}")]
    UnsupportedVerb(String),
}

/// Errors from the local storage collaborator.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Underlying filesystem failure
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Original error
        #[source]
        source: std::io::Error,
    },

    /// Nothing stored at the path
    #[error("Nothing stored at {}", .0.display())]
    NotFound(PathBuf),
}

/// Why a sub-operation finished without a usable response.
///
/// Carried by [`Completion`](crate::callbacks::Completion); the registry
/// treats failed and successful sub-operations identically for reaping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    /// The transport reported a failure (including cancellation)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response arrived but could not be saved locally
    #[error("Failed to save response: {0}")]
    Persistence(String),
}

impl From<PersistenceError> for RequestFailure {
    fn from(err: PersistenceError) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<PersistenceError> for RequestError {
    fn from(err: PersistenceError) -> Self {
        Self::Source(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_not_found_message() {
        let err = RequestError::HandleNotFound(Handle::new("not-a-real-handle"));
        assert_eq!(err.to_string(), "The handle was not found [not-a-real-handle]");
    }

    #[test]
    fn test_partial_cancel_message() {
        let err = RequestError::PartialCancel { failed: 1, total: 3 };
        assert_eq!(err.to_string(), "1 of 3 sub-operations could not be cancelled");
    }

    #[test]
    fn test_persistence_error_converts_to_failure() {
        let err = PersistenceError::NotFound(PathBuf::from("/tmp/missing.bin"));
        let failure = RequestFailure::from(err);
        assert!(matches!(failure, RequestFailure::Persistence(msg) if msg.contains("missing.bin")));
    }
}
