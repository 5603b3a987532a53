//! LMDB-backed structured storage.
//!
//! Uses the heed crate (Rust bindings for LMDB). Each logical database gets
//! its own LMDB environment directory; each collection is a named database
//! inside that environment, keyed by record id with the record stored as
//! JSON.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `find` and `find_by_id`
//! - One write transaction per `save` batch and per `remove_by_id`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cairn_core::{CairnError, CairnResult, Record, StorageError, StorageTechnology};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use tracing::debug;

use crate::adapter::{not_found, record_key, StorageAdapter, StorageBackend};

/// Error type for LMDB storage operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database {name}: {reason}")]
    DbOpen { name: String, reason: String },

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbError to CairnError.
impl From<LmdbError> for CairnError {
    fn from(e: LmdbError) -> Self {
        CairnError::Storage(StorageError::Backend {
            technology: StorageTechnology::Lmdb.to_string(),
            reason: e.to_string(),
        })
    }
}

fn txn_err(e: heed::Error) -> LmdbError {
    LmdbError::Transaction(e.to_string())
}

/// LMDB environment for one logical database.
///
/// # Example
///
/// ```ignore
/// use cairn_storage::backends::LmdbBackend;
///
/// let backend = LmdbBackend::new("my-app", "/tmp/cairn/my-app/lmdb", 64, 128)?;
/// let notes = backend.open("notes").await?;
/// notes.save(vec![record]).await?;
/// ```
pub struct LmdbBackend {
    database: String,
    path: PathBuf,
    env: Env,
}

impl std::fmt::Debug for LmdbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbBackend")
            .field("database", &self.database)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LmdbBackend {
    /// Open (creating if needed) an LMDB environment.
    ///
    /// # Arguments
    ///
    /// * `database` - Logical database name
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the environment in megabytes
    /// * `max_collections` - Maximum number of named databases (collections)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_size_mb` does not fit in the address space
    /// - The directory cannot be created
    /// - The LMDB environment cannot be opened
    pub fn new<P: AsRef<Path>>(
        database: impl Into<String>,
        path: P,
        max_size_mb: usize,
        max_collections: u32,
    ) -> Result<Self, LmdbError> {
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| LmdbError::EnvOpen(format!("map size of {} MB overflows", max_size_mb)))?;
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_collections)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbError::EnvOpen(e.to_string()))?;

        Ok(Self {
            database: database.into(),
            path: path.as_ref().to_path_buf(),
            env,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StorageBackend for LmdbBackend {
    fn technology(&self) -> StorageTechnology {
        StorageTechnology::Lmdb
    }

    fn database(&self) -> &str {
        &self.database
    }

    async fn is_supported(&self) -> bool {
        self.env.read_txn().is_ok()
    }

    async fn open(&self, collection: &str) -> CairnResult<Arc<dyn StorageAdapter>> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let db: Database<Str, Bytes> = self
            .env
            .create_database(&mut wtxn, Some(collection))
            .map_err(|e| LmdbError::DbOpen {
                name: collection.to_string(),
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(txn_err)?;

        debug!(collection, path = %self.path.display(), "opened LMDB collection");
        Ok(Arc::new(LmdbAdapter {
            collection: collection.to_string(),
            env: self.env.clone(),
            db,
        }))
    }
}

/// One named LMDB database.
pub struct LmdbAdapter {
    collection: String,
    env: Env,
    db: Database<Str, Bytes>,
}

impl LmdbAdapter {
    fn decode(&self, bytes: &[u8]) -> Result<Record, LmdbError> {
        serde_json::from_slice(bytes).map_err(|e| LmdbError::Deserialization(e.to_string()))
    }
}

#[async_trait]
impl StorageAdapter for LmdbAdapter {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn find(&self) -> CairnResult<Vec<Record>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut records = Vec::new();
        for entry in self.db.iter(&rtxn).map_err(txn_err)? {
            let (_, bytes) = entry.map_err(txn_err)?;
            records.push(self.decode(bytes)?);
        }
        Ok(records)
    }

    async fn find_by_id(&self, id: &str) -> CairnResult<Record> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self.db.get(&rtxn, id).map_err(txn_err)? {
            Some(bytes) => Ok(self.decode(bytes)?),
            None => Err(not_found(&self.collection, Some(id))),
        }
    }

    async fn save(&self, records: Vec<Record>) -> CairnResult<Vec<Record>> {
        let mut encoded = Vec::with_capacity(records.len());
        for record in &records {
            let key = record_key(&self.collection, record)?;
            let bytes = serde_json::to_vec(record)
                .map_err(|e| LmdbError::Serialization(e.to_string()))?;
            encoded.push((key, bytes));
        }

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        for (key, bytes) in &encoded {
            self.db.put(&mut wtxn, key, bytes).map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;

        Ok(records)
    }

    async fn remove_by_id(&self, id: &str) -> CairnResult<Record> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let existing = match self.db.get(&wtxn, id).map_err(txn_err)? {
            Some(bytes) => self.decode(bytes)?,
            None => return Err(not_found(&self.collection, Some(id))),
        };
        self.db.delete(&mut wtxn, id).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(existing)
    }
}
