//! SQLite-backed relational storage.
//!
//! One database file per logical database, one table per collection, one
//! row per record: `(id TEXT PRIMARY KEY, body TEXT)` with the record
//! serialized as JSON in `body`. Tables are named `c_<collection>` so no
//! collection name collides with SQLite's reserved `sqlite_` namespace.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cairn_core::{CairnError, CairnResult, Record, StorageError, StorageTechnology};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::adapter::{not_found, record_key, StorageAdapter, StorageBackend};

/// Error type for SQLite storage operations.
#[derive(Debug, thiserror::Error)]
pub enum SqliteError {
    /// Failed to open the database file.
    #[error("Failed to open SQLite database {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// Statement error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Stored body is not a valid record.
    #[error("Corrupt row {id} in {table}: {reason}")]
    Corrupt {
        table: String,
        id: String,
        reason: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SqliteError> for CairnError {
    fn from(e: SqliteError) -> Self {
        CairnError::Storage(StorageError::Backend {
            technology: StorageTechnology::Sqlite.to_string(),
            reason: e.to_string(),
        })
    }
}

type SharedConnection = Arc<Mutex<Connection>>;

fn lock(conn: &SharedConnection) -> CairnResult<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| StorageError::LockPoisoned.into())
}

/// SQLite database for one logical database.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    database: String,
    path: Option<PathBuf>,
    conn: SharedConnection,
}

impl SqliteBackend {
    /// Open (creating if needed) `<dir>/<database>.sqlite3`.
    pub fn open_in_dir<P: AsRef<Path>>(
        database: impl Into<String>,
        dir: P,
    ) -> Result<Self, SqliteError> {
        let database = database.into();
        std::fs::create_dir_all(&dir)?;
        let path = dir.as_ref().join(format!("{}.sqlite3", database));
        let conn = Connection::open(&path).map_err(|e| SqliteError::Open {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            database,
            path: Some(path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A private in-memory SQLite database.
    pub fn open_in_memory(database: impl Into<String>) -> Result<Self, SqliteError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            database: database.into(),
            path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Database file, if not in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn technology(&self) -> StorageTechnology {
        StorageTechnology::Sqlite
    }

    fn database(&self) -> &str {
        &self.database
    }

    async fn is_supported(&self) -> bool {
        match lock(&self.conn) {
            Ok(conn) => conn
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok(),
            Err(_) => false,
        }
    }

    async fn open(&self, collection: &str) -> CairnResult<Arc<dyn StorageAdapter>> {
        let table = table_name(collection);
        {
            let conn = lock(&self.conn)?;
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY NOT NULL, body TEXT NOT NULL)",
                    table
                ),
                [],
            )
            .map_err(SqliteError::from)?;
        }
        debug!(collection, "opened SQLite collection");
        Ok(Arc::new(SqliteAdapter {
            collection: collection.to_string(),
            table,
            conn: Arc::clone(&self.conn),
        }))
    }
}

/// One table.
#[derive(Debug)]
pub struct SqliteAdapter {
    collection: String,
    table: String,
    conn: SharedConnection,
}

impl SqliteAdapter {
    fn decode(&self, id: &str, body: &str) -> Result<Record, SqliteError> {
        serde_json::from_str(body).map_err(|e| SqliteError::Corrupt {
            table: self.collection.clone(),
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    fn select_one(&self, conn: &Connection, id: &str) -> Result<Option<Record>, SqliteError> {
        let body: Option<String> = conn
            .query_row(
                &format!("SELECT body FROM {} WHERE id = ?1", self.table),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|body| self.decode(id, &body)).transpose()
    }
}

#[async_trait]
impl StorageAdapter for SqliteAdapter {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn find(&self) -> CairnResult<Vec<Record>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(&format!("SELECT id, body FROM {} ORDER BY rowid", self.table))
            .map_err(SqliteError::from)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(SqliteError::from)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, body) = row.map_err(SqliteError::from)?;
            records.push(self.decode(&id, &body)?);
        }
        Ok(records)
    }

    async fn find_by_id(&self, id: &str) -> CairnResult<Record> {
        let conn = lock(&self.conn)?;
        self.select_one(&conn, id)?
            .ok_or_else(|| not_found(&self.collection, Some(id)))
    }

    async fn save(&self, records: Vec<Record>) -> CairnResult<Vec<Record>> {
        let mut encoded = Vec::with_capacity(records.len());
        for record in &records {
            let key = record_key(&self.collection, record)?;
            let body = serde_json::to_string(record)
                .map_err(|e| SqliteError::Serialization(e.to_string()))?;
            encoded.push((key, body));
        }

        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction().map_err(SqliteError::from)?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {} (id, body) VALUES (?1, ?2) \
                     ON CONFLICT(id) DO UPDATE SET body = excluded.body",
                    self.table
                ))
                .map_err(SqliteError::from)?;
            for (key, body) in &encoded {
                stmt.execute(params![key, body]).map_err(SqliteError::from)?;
            }
        }
        tx.commit().map_err(SqliteError::from)?;

        Ok(records)
    }

    async fn remove_by_id(&self, id: &str) -> CairnResult<Record> {
        let conn = lock(&self.conn)?;
        let existing = self
            .select_one(&conn, id)?
            .ok_or_else(|| not_found(&self.collection, Some(id)))?;
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.table),
            params![id],
        )
        .map_err(SqliteError::from)?;
        Ok(existing)
    }
}

/// Quoted table identifier for a collection.
fn table_name(collection: &str) -> String {
    quote_identifier(&format!("c_{}", collection))
}

/// Quote a name as an SQL identifier.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
