//! Filesystem-backed persistence.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tickwire_core::{Persistence, PersistenceError};

/// Stores downloads and reads uploads on the local filesystem.
///
/// Missing parent directories are created on save.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsPersistence;

impl FsPersistence {
    /// Create a filesystem persistence.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Persistence for FsPersistence {
    fn save_bytes(&self, path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
        let io_err = |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, bytes).map_err(io_err)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Saved file");
        Ok(())
    }

    fn load_bytes(&self, path: &Path) -> Result<Vec<u8>, PersistenceError> {
        fs::read(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                PersistenceError::NotFound(path.to_path_buf())
            } else {
                PersistenceError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tickwire-fs-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = scratch_dir();
        let path = dir.join("nested/deeper/file.bin");

        FsPersistence::new().save_bytes(&path, b"abc").unwrap();
        assert_eq!(FsPersistence::new().load_bytes(&path).unwrap(), b"abc".to_vec());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let path = scratch_dir().join("missing.bin");
        let err = FsPersistence::new().load_bytes(&path).unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(p) if p == path));
    }
}
