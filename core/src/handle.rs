//! Request handle identification.
//!
//! This module defines the opaque identifier (`Handle`) under which every
//! tracked request lives in the registry, and the generator abstraction that
//! produces fresh handles (`HandleGenerator`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `Handle` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid handle: {0}")]
pub struct ParseHandleError(String);

/// Opaque identifier naming one tracked request.
///
/// Handles are generated at registration time and never reused. Equality is
/// an exact string match, so two handles compare equal only if their text is
/// byte-for-byte identical.
///
/// # Validation
///
/// - `FromStr::from_str()`: rejects empty strings
/// - `From::from()` and `new()`: no validation (trusted input)
///
/// # Examples
///
/// ```
/// use tickwire_core::handle::Handle;
///
/// let handle = Handle::new("7c1f0c9e-3f7a-4c52-9d0e-6b1f1e0a2b44");
/// assert_eq!(handle.as_str(), "7c1f0c9e-3f7a-4c52-9d0e-6b1f1e0a2b44");
///
/// let parsed: Handle = "request-1".parse().unwrap();
/// assert_eq!(parsed, Handle::new("request-1"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    /// Create a new `Handle` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the handle as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `Handle` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Handle {
    type Err = ParseHandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseHandleError("Handle cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for Handle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Handle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Produces statistically unique handles on demand.
///
/// The registry asks the generator for a new handle on every registration
/// and regenerates on the (unlikely) collision with a live entry.
/// Implementations must never hand out the same text twice, otherwise a
/// caller holding a reaped handle could observe a different request.
pub trait HandleGenerator: Send + Sync {
    /// Generate the next handle.
    fn next_handle(&self) -> Handle;
}

/// Default generator backed by random (v4) UUIDs.
///
/// # Examples
///
/// ```
/// use tickwire_core::handle::{HandleGenerator, UuidHandleGenerator};
///
/// let generator = UuidHandleGenerator;
/// assert_ne!(generator.next_handle(), generator.next_handle());
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidHandleGenerator;

impl HandleGenerator for UuidHandleGenerator {
    fn next_handle(&self) -> Handle {
        Handle(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_handle_parse_rejects_empty() {
        assert!("".parse::<Handle>().is_err());
        assert_eq!("abc".parse::<Handle>().unwrap(), Handle::from("abc"));
    }

    #[test]
    fn test_handle_equality_is_exact() {
        assert_ne!(Handle::new("abc"), Handle::new("ABC"));
        assert_ne!(Handle::new("abc"), Handle::new("abc "));
    }

    #[test]
    fn test_uuid_generator_produces_distinct_handles() {
        let generator = UuidHandleGenerator;
        let handles: HashSet<Handle> = (0..1000).map(|_| generator.next_handle()).collect();
        assert_eq!(handles.len(), 1000);
    }

    #[test]
    fn test_handle_serializes_as_plain_string() {
        let handle = Handle::new("h-1");
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, "\"h-1\"");
        let back: Handle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, handle);
    }
}
