//! Local storage collaborator.
//!
//! Used to write downloaded bodies to disk and to read upload sources that
//! name a local file. Not part of the registry contract itself.

use crate::error::PersistenceError;
use std::path::Path;

/// Reads and writes whole byte buffers at local paths.
pub trait Persistence: Send + Sync {
    /// Write `bytes` to `path`, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the write fails.
    fn save_bytes(&self, path: &Path, bytes: &[u8]) -> Result<(), PersistenceError>;

    /// Read the full content stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if nothing can be read at `path`.
    fn load_bytes(&self, path: &Path) -> Result<Vec<u8>, PersistenceError>;
}
