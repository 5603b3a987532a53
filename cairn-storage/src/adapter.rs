//! Storage adapter traits.
//!
//! A [`StorageBackend`] is one storage technology bound to one logical
//! database. It hands out one [`StorageAdapter`] per collection. The cache
//! engine only ever talks to these two traits; it never inspects which
//! technology sits behind them.
//!
//! # Not-found convention
//!
//! Adapters report missing records (and, where the technology distinguishes
//! it, missing collections) as [`StorageError::NotFound`]. The cache engine
//! normalizes that into empty results; every other error propagates.

use std::sync::Arc;

use async_trait::async_trait;
use cairn_core::{CairnResult, Record, StorageError, StorageTechnology};

/// One storage technology bound to one logical database.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// The technology this backend implements.
    fn technology(&self) -> StorageTechnology;

    /// Name of the logical database this backend owns.
    fn database(&self) -> &str;

    /// Whether the technology is usable in the current environment.
    async fn is_supported(&self) -> bool;

    /// Open (creating if needed) the store for one collection.
    async fn open(&self, collection: &str) -> CairnResult<Arc<dyn StorageAdapter>>;
}

/// CRUD over the records of a single collection.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Collection this adapter is bound to.
    fn collection(&self) -> &str;

    /// Every record in the collection.
    async fn find(&self) -> CairnResult<Vec<Record>>;

    /// One record by id; [`StorageError::NotFound`] if absent.
    async fn find_by_id(&self, id: &str) -> CairnResult<Record>;

    /// Insert or replace records keyed by their id. Every record must carry
    /// a string id.
    async fn save(&self, records: Vec<Record>) -> CairnResult<Vec<Record>>;

    /// Delete one record by id and return it; [`StorageError::NotFound`] if
    /// absent.
    async fn remove_by_id(&self, id: &str) -> CairnResult<Record>;
}

/// Build the not-found error for `id` in `collection`.
pub fn not_found(collection: &str, id: Option<&str>) -> cairn_core::CairnError {
    StorageError::NotFound {
        collection: collection.to_string(),
        id: id.map(str::to_string),
    }
    .into()
}

/// Extract the id an adapter keys a record by.
pub fn record_key<'r>(collection: &str, record: &'r Record) -> CairnResult<&'r str> {
    record.id().ok_or_else(|| {
        cairn_core::ValidationError::InvalidRecord {
            reason: format!("record saved to {} has no string id", collection),
        }
        .into()
    })
}
