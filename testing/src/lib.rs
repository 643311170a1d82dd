//! # Tickwire Testing
//!
//! Testing utilities and helpers for the Tickwire request lifecycle manager.
//!
//! This crate provides:
//! - [`MockTransport`]: a scripted, tick-stepped transport
//! - [`CallbackRecorder`]: captures callback invocations in order
//! - [`InMemoryPersistence`]: `HashMap`-backed local storage
//! - [`SequentialHandleGenerator`]: predictable handles
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tickwire_testing::{CallbackRecorder, MockResponse, MockTransport};
//!
//! let transport = Arc::new(MockTransport::new());
//! transport.respond("http://test/a", MockResponse::ok(b"a".to_vec()));
//! let manager = RequestManager::new(transport.clone());
//!
//! let recorder = CallbackRecorder::new();
//! let handle = manager.submit_get("http://test/a", recorder.callbacks())?;
//! manager.tick(Duration::ZERO);
//! assert_eq!(recorder.completions().len(), 1);
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tickwire_core::{Handle, HandleGenerator, Persistence, PersistenceError};

/// Scripted transport
pub mod mocks;

/// Callback recording
pub mod recorder;

pub use mocks::{MockResponse, MockTransport};
pub use recorder::{CallbackRecorder, RecordedEvent};

/// Predictable handles: `<prefix>-1`, `<prefix>-2`, ...
///
/// # Example
///
/// ```
/// use tickwire_core::HandleGenerator;
/// use tickwire_testing::SequentialHandleGenerator;
///
/// let generator = SequentialHandleGenerator::new("req");
/// assert_eq!(generator.next_handle().as_str(), "req-1");
/// assert_eq!(generator.next_handle().as_str(), "req-2");
/// ```
#[derive(Debug)]
pub struct SequentialHandleGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialHandleGenerator {
    /// Create a generator starting at 1.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl HandleGenerator for SequentialHandleGenerator {
    fn next_handle(&self) -> Handle {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Handle::new(format!("{}-{n}", self.prefix))
    }
}

/// In-memory persistence for fast, deterministic tests.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPersistence {
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
}

impl InMemoryPersistence {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, for example an upload source.
    pub fn insert(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.files.write().unwrap().insert(path.into(), bytes.into());
    }

    /// Whether something is stored at `path`.
    #[must_use]
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.read().unwrap().contains_key(path.as_ref())
    }

    /// Number of stored files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.read().unwrap().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.read().unwrap().is_empty()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_bytes(&self, path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
        self.files
            .write()
            .unwrap()
            .insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn load_bytes(&self, path: &Path) -> Result<Vec<u8>, PersistenceError> {
        self.files
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(path.to_path_buf()))
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honours `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Property-based testing strategies.
pub mod properties {
    use proptest::prelude::*;

    /// Plausible request URLs on a fixed test host.
    pub fn url() -> impl Strategy<Value = String> {
        "[a-z]{1,8}(/[a-z0-9]{1,8}){0,2}".prop_map(|path| format!("http://test/{path}"))
    }

    /// Completion delays in ticks.
    pub fn ticks() -> impl Strategy<Value = u32> {
        1u32..6
    }
}
