//! Request kinds and upload payloads.

use crate::error::RequestError;
use crate::persistence::Persistence;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;

/// Shape of a logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RequestKind {
    /// Exactly one live sub-operation
    #[default]
    Single,
    /// Fans out to N sub-operations and reports an aggregate completion
    Multiple,
}

impl RequestKind {
    /// Whether batch verbs may be issued against this kind.
    #[must_use]
    pub const fn allows_batch(self) -> bool {
        matches!(self, Self::Multiple)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multiple => write!(f, "multiple"),
        }
    }
}

/// Body source for uploads and raw requests.
///
/// Every variant is turned into bytes when the operation is issued, so a
/// `Reader` is drained and a `File` is read once, up front.
pub enum Payload {
    /// In-memory buffer
    Bytes(Vec<u8>),
    /// UTF-8 text
    Text(String),
    /// Content of a local file
    File(PathBuf),
    /// Anything readable
    Reader(Box<dyn Read + Send>),
}

impl Payload {
    /// Resolve the payload into the bytes to send.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Source`] if the file or reader cannot be read.
    pub fn into_bytes(self, persistence: &dyn Persistence) -> Result<Vec<u8>, RequestError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Text(text) => Ok(text.into_bytes()),
            Self::File(path) => Ok(persistence.load_bytes(&path)?),
            Self::Reader(mut reader) => {
                let mut bytes = Vec::new();
                reader
                    .read_to_end(&mut bytes)
                    .map_err(|e| RequestError::Source(e.to_string()))?;
                Ok(bytes)
            }
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Payload::Bytes").field(&bytes.len()).finish(),
            Self::Text(text) => f.debug_tuple("Payload::Text").field(&text.len()).finish(),
            Self::File(path) => f.debug_tuple("Payload::File").field(path).finish(),
            Self::Reader(_) => write!(f, "Payload::Reader(<reader>)"),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<PathBuf> for Payload {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use std::io::Cursor;
    use std::path::Path;

    struct OneFile;

    impl Persistence for OneFile {
        fn save_bytes(&self, _path: &Path, _bytes: &[u8]) -> Result<(), PersistenceError> {
            Ok(())
        }

        fn load_bytes(&self, path: &Path) -> Result<Vec<u8>, PersistenceError> {
            if path == Path::new("/data/upload.bin") {
                Ok(vec![9, 9, 9])
            } else {
                Err(PersistenceError::NotFound(path.to_path_buf()))
            }
        }
    }

    #[test]
    fn test_text_and_bytes_resolve_directly() {
        assert_eq!(Payload::from("hi").into_bytes(&OneFile).unwrap(), b"hi".to_vec());
        assert_eq!(Payload::from(vec![1, 2]).into_bytes(&OneFile).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_reader_is_drained() {
        let payload = Payload::Reader(Box::new(Cursor::new(vec![4, 5, 6])));
        assert_eq!(payload.into_bytes(&OneFile).unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn test_file_goes_through_persistence() {
        let payload = Payload::from(PathBuf::from("/data/upload.bin"));
        assert_eq!(payload.into_bytes(&OneFile).unwrap(), vec![9, 9, 9]);

        let missing = Payload::File(PathBuf::from("/data/missing.bin"));
        assert!(matches!(missing.into_bytes(&OneFile), Err(RequestError::Source(_))));
    }

    #[test]
    fn test_only_multiple_allows_batch() {
        assert!(!RequestKind::Single.allows_batch());
        assert!(RequestKind::Multiple.allows_batch());
    }
}
