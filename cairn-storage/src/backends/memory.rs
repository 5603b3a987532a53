//! In-memory backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cairn_core::{CairnResult, Record, StorageError, StorageTechnology};

use crate::adapter::{not_found, record_key, StorageAdapter, StorageBackend};

type Table = BTreeMap<String, Record>;
type Tables = Arc<RwLock<HashMap<String, Table>>>;

/// In-memory tables for one logical database.
///
/// Always supported. Contents live as long as the backend (and any adapter
/// opened from it).
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    database: String,
    tables: Tables,
}

impl MemoryBackend {
    /// Create a new in-memory backend.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            tables: Tables::default(),
        }
    }

    /// Number of records in a collection.
    pub fn record_count(&self, collection: &str) -> usize {
        self.tables
            .read()
            .map(|tables| tables.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Drop every collection.
    pub fn clear(&self) -> CairnResult<()> {
        self.tables
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn technology(&self) -> StorageTechnology {
        StorageTechnology::Memory
    }

    fn database(&self) -> &str {
        &self.database
    }

    async fn is_supported(&self) -> bool {
        true
    }

    async fn open(&self, collection: &str) -> CairnResult<Arc<dyn StorageAdapter>> {
        Ok(Arc::new(MemoryAdapter {
            collection: collection.to_string(),
            tables: Arc::clone(&self.tables),
        }))
    }
}

/// One collection's view of a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryAdapter {
    collection: String,
    tables: Tables,
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn find(&self) -> CairnResult<Vec<Record>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let table = tables
            .get(&self.collection)
            .ok_or_else(|| not_found(&self.collection, None))?;
        Ok(table.values().cloned().collect())
    }

    async fn find_by_id(&self, id: &str) -> CairnResult<Record> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        tables
            .get(&self.collection)
            .and_then(|table| table.get(id))
            .cloned()
            .ok_or_else(|| not_found(&self.collection, Some(id)))
    }

    async fn save(&self, records: Vec<Record>) -> CairnResult<Vec<Record>> {
        let keys = records
            .iter()
            .map(|record| record_key(&self.collection, record).map(str::to_string))
            .collect::<CairnResult<Vec<_>>>()?;

        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let table = tables.entry(self.collection.clone()).or_default();
        for (key, record) in keys.into_iter().zip(&records) {
            table.insert(key, record.clone());
        }
        Ok(records)
    }

    async fn remove_by_id(&self, id: &str) -> CairnResult<Record> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        tables
            .get_mut(&self.collection)
            .and_then(|table| table.remove(id))
            .ok_or_else(|| not_found(&self.collection, Some(id)))
    }
}
