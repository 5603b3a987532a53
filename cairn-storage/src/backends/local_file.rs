//! File-backed key-value backend.
//!
//! Each collection is one JSON document (`<collection>.json`) holding an
//! object that maps record id to record. Reads load the whole document;
//! writes rewrite it through a temporary file and an atomic rename, so a
//! crash mid-write leaves the previous version intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cairn_core::{CairnError, CairnResult, Record, StorageError, StorageTechnology};
use tracing::debug;

use crate::adapter::{not_found, record_key, StorageAdapter, StorageBackend};

/// Error type for local file operations.
#[derive(Debug, thiserror::Error)]
pub enum LocalFileError {
    /// I/O error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored document is not a valid collection.
    #[error("Corrupt collection document {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<LocalFileError> for CairnError {
    fn from(e: LocalFileError) -> Self {
        CairnError::Storage(StorageError::Backend {
            technology: StorageTechnology::LocalStorage.to_string(),
            reason: e.to_string(),
        })
    }
}

type Document = BTreeMap<String, Record>;

/// Key-value documents under `<root>/`, one per collection.
#[derive(Debug, Clone)]
pub struct LocalFileBackend {
    database: String,
    root: PathBuf,
}

impl LocalFileBackend {
    /// Create a backend rooted at `root`. The directory is created lazily.
    pub fn new(database: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(collection)))
    }
}

#[async_trait]
impl StorageBackend for LocalFileBackend {
    fn technology(&self) -> StorageTechnology {
        StorageTechnology::LocalStorage
    }

    fn database(&self) -> &str {
        &self.database
    }

    async fn is_supported(&self) -> bool {
        let marker = self.root.join(".writable");
        fs::create_dir_all(&self.root)
            .and_then(|_| fs::write(&marker, b"ok"))
            .and_then(|_| fs::remove_file(&marker))
            .is_ok()
    }

    async fn open(&self, collection: &str) -> CairnResult<Arc<dyn StorageAdapter>> {
        fs::create_dir_all(&self.root).map_err(|source| LocalFileError::Io {
            path: self.root.clone(),
            source,
        })?;
        let path = self.document_path(collection);
        debug!(collection, path = %path.display(), "opened local file collection");
        Ok(Arc::new(LocalFileAdapter {
            collection: collection.to_string(),
            path,
            write_lock: Mutex::new(()),
        }))
    }
}

/// One collection document.
#[derive(Debug)]
pub struct LocalFileAdapter {
    collection: String,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalFileAdapter {
    /// Load the document; `None` if it was never written.
    fn load(&self) -> Result<Option<Document>, LocalFileError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LocalFileError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| LocalFileError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    fn store(&self, document: &Document) -> Result<(), LocalFileError> {
        let bytes = serde_json::to_vec(document)
            .map_err(|e| LocalFileError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|source| LocalFileError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| LocalFileError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl StorageAdapter for LocalFileAdapter {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn find(&self) -> CairnResult<Vec<Record>> {
        match self.load()? {
            Some(document) => Ok(document.into_values().collect()),
            None => Err(not_found(&self.collection, None)),
        }
    }

    async fn find_by_id(&self, id: &str) -> CairnResult<Record> {
        self.load()?
            .and_then(|mut document| document.remove(id))
            .ok_or_else(|| not_found(&self.collection, Some(id)))
    }

    async fn save(&self, records: Vec<Record>) -> CairnResult<Vec<Record>> {
        let keys = records
            .iter()
            .map(|record| record_key(&self.collection, record).map(str::to_string))
            .collect::<CairnResult<Vec<_>>>()?;

        let _guard = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        let mut document = self.load()?.unwrap_or_default();
        for (key, record) in keys.into_iter().zip(&records) {
            document.insert(key, record.clone());
        }
        self.store(&document)?;
        Ok(records)
    }

    async fn remove_by_id(&self, id: &str) -> CairnResult<Record> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        let mut document = self
            .load()?
            .ok_or_else(|| not_found(&self.collection, Some(id)))?;
        let removed = document
            .remove(id)
            .ok_or_else(|| not_found(&self.collection, Some(id)))?;
        self.store(&document)?;
        Ok(removed)
    }
}

/// Map a collection name to a safe file stem. Characters outside
/// `[A-Za-z0-9_-]` are hex-escaped as `%XX`.
fn file_stem(collection: &str) -> String {
    let mut stem = String::with_capacity(collection.len());
    for byte in collection.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}
