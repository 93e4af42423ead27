// CLASSIFICATION: COMMUNITY
// Filename: storage.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-02-09

//! Flat key-value object storage.
//!
//! The master reads scene objects and the manifest through the same backend
//! the workers fetch from. Backends are selected by URI scheme: `file://`
//! maps keys onto a directory tree, `mem://` is an in-process map used by
//! tests.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Error raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend URI was not understood.
    #[error("unsupported storage uri {0:?}")]
    BadUri(String),
    /// The requested key does not exist.
    #[error("no such object {0:?}")]
    NotFound(String),
    /// Underlying I/O failure.
    #[error("storage i/o: {0}")]
    Io(#[from] io::Error),
}

/// A flat key-value store for scene objects and logs.
pub trait StorageBackend: Send + Sync {
    /// Fetch the object stored under `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Store `data` under `key`, replacing any previous value.
    fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;
}

/// Backend rooted at a local directory. Keys may contain `/`, which maps to
/// subdirectories.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Backend over `root`, created if absent.
    pub fn new(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.root.join(key);
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}

/// In-process backend shared by cloning; used by tests.
#[derive(Default, Clone)]
pub struct MemBackend {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemBackend {
    /// New empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemBackend {
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .expect("storage map poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_owned()))
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.objects
            .lock()
            .expect("storage map poisoned")
            .insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}

/// Open the backend named by `uri`.
pub fn open_backend(uri: &str) -> Result<Arc<dyn StorageBackend>, StorageError> {
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(Arc::new(FileBackend::new(PathBuf::from(path))?));
    }
    if uri == "mem://" {
        return Ok(Arc::new(MemBackend::new()));
    }
    Err(StorageError::BadUri(uri.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf()).unwrap();
        backend.put("T_0", b"root treelet").unwrap();
        backend.put("logs/3.DIAG", b"{}").unwrap();
        assert_eq!(backend.get("T_0").unwrap(), b"root treelet");
        assert_eq!(backend.get("logs/3.DIAG").unwrap(), b"{}");
        assert!(matches!(
            backend.get("T_1"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn mem_backend_is_shared_between_clones() {
        let a = MemBackend::new();
        let b = a.clone();
        a.put("SCENE_0", b"{}").unwrap();
        assert_eq!(b.get("SCENE_0").unwrap(), b"{}");
    }

    #[test]
    fn uri_scheme_selection() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("file://{}", dir.path().display());
        open_backend(&uri).unwrap();
        open_backend("mem://").unwrap();
        assert!(matches!(
            open_backend("s3://bucket"),
            Err(StorageError::BadUri(_))
        ));
    }
}
