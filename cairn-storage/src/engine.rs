//! Local cache engine.
//!
//! [`CacheEngine`] is the uniform CRUD surface over whichever backend the
//! provider selector committed to. It opens one adapter per collection on
//! first use, runs every operation through the shared
//! [`OperationSerializer`] under the key `"<database>/<collection>"`, and
//! turns adapter not-found errors into empty results.

use std::collections::HashMap;
use std::sync::Arc;

use cairn_core::{
    generate_id, is_reserved_collection, AggregationProcessor, CacheSettings, CairnError,
    CairnResult, Query, QueryProcessor, Record, StorageError, StorageTechnology, ValidationError,
    ID_FIELD, LOCAL_FLAG, PROBE_COLLECTION,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::adapter::{StorageAdapter, StorageBackend};
use crate::serializer::OperationSerializer;

/// Identifier of the record written by liveness probes.
const PROBE_ID: &str = "probe";

/// Result of [`CacheEngine::count`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResult {
    pub count: usize,
}

/// What [`CacheEngine::save`] accepts: one record or many.
///
/// A single record in gives a single record out; a sequence in gives a
/// sequence of the same length out.
pub trait SaveInput: Send {
    type Output;

    fn into_records(self) -> Vec<Record>;

    /// Rebuild the output shape from the saved records; `None` if the
    /// adapter returned fewer records than it was given.
    fn from_records(records: Vec<Record>) -> Option<Self::Output>;
}

impl SaveInput for Record {
    type Output = Record;

    fn into_records(self) -> Vec<Record> {
        vec![self]
    }

    fn from_records(records: Vec<Record>) -> Option<Record> {
        records.into_iter().next()
    }
}

impl SaveInput for Vec<Record> {
    type Output = Vec<Record>;

    fn into_records(self) -> Vec<Record> {
        self
    }

    fn from_records(records: Vec<Record>) -> Option<Vec<Record>> {
        Some(records)
    }
}

/// CRUD over the collections of one logical database.
pub struct CacheEngine {
    backend: Arc<dyn StorageBackend>,
    serializer: OperationSerializer,
    id_length: usize,
    adapters: Mutex<HashMap<String, Arc<dyn StorageAdapter>>>,
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("technology", &self.backend.technology())
            .field("database", &self.backend.database())
            .field("id_length", &self.id_length)
            .finish_non_exhaustive()
    }
}

impl CacheEngine {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        serializer: OperationSerializer,
        settings: &CacheSettings,
    ) -> Self {
        Self {
            backend,
            serializer,
            id_length: settings.id_length,
            adapters: Mutex::new(HashMap::new()),
        }
    }

    pub fn technology(&self) -> StorageTechnology {
        self.backend.technology()
    }

    pub fn database(&self) -> &str {
        self.backend.database()
    }

    pub fn serializer(&self) -> &OperationSerializer {
        &self.serializer
    }

    /// Serializer key for a collection.
    pub fn key(&self, collection: &str) -> String {
        format!("{}/{}", self.database(), collection)
    }

    /// Collections opened so far, sorted.
    pub async fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .adapters
            .lock()
            .await
            .keys()
            .filter(|name| !is_reserved_collection(name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Records in `collection` selected by `query` (all records if `None`).
    pub async fn find(&self, collection: &str, query: Option<&Query>) -> CairnResult<Vec<Record>> {
        self.find_with(collection, query.map(|q| q as &dyn QueryProcessor))
            .await
    }

    /// Like [`find`](Self::find) with any query processor.
    pub async fn find_with(
        &self,
        collection: &str,
        processor: Option<&dyn QueryProcessor>,
    ) -> CairnResult<Vec<Record>> {
        check_collection(collection)?;
        self.serializer
            .run(self.key(collection), || async {
                let records = self.load_all(collection).await?;
                match processor {
                    Some(processor) => processor.process(records),
                    None => Ok(records),
                }
            })
            .await
    }

    /// Number of records [`find`](Self::find) would return.
    pub async fn count(&self, collection: &str, query: Option<&Query>) -> CairnResult<CountResult> {
        let records = self.find(collection, query).await?;
        Ok(CountResult {
            count: records.len(),
        })
    }

    /// Run `aggregation` over every record in `collection`.
    ///
    /// Returns `None` when the collection holds no records.
    pub async fn group(
        &self,
        collection: &str,
        aggregation: &dyn AggregationProcessor,
    ) -> CairnResult<Option<Value>> {
        check_collection(collection)?;
        self.serializer
            .run(self.key(collection), || async {
                let records = self.load_all(collection).await?;
                if records.is_empty() {
                    return Ok(None);
                }
                aggregation.process(records).map(Some)
            })
            .await
    }

    /// One record by id. The id must be a JSON string.
    pub async fn find_by_id(
        &self,
        collection: &str,
        id: impl Into<Value>,
    ) -> CairnResult<Option<Record>> {
        check_collection(collection)?;
        let id = require_string_id("find_by_id", id.into())?;
        self.serializer
            .run(self.key(collection), || async {
                let adapter = self.adapter(collection).await?;
                or_none(adapter.find_by_id(&id).await)
            })
            .await
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Save one record or a sequence of records.
    ///
    /// Records without an id get a generated one and are flagged as locally
    /// created in their metadata. Records that carry an id keep their
    /// metadata, defaulted to an empty object.
    pub async fn save<S: SaveInput>(&self, collection: &str, input: S) -> CairnResult<S::Output> {
        check_collection(collection)?;
        let records = input
            .into_records()
            .into_iter()
            .map(|record| self.prepare(record))
            .collect::<CairnResult<Vec<_>>>()?;
        let expected = records.len();

        let saved = self
            .serializer
            .run(self.key(collection), move || async move {
                if records.is_empty() {
                    return Ok(records);
                }
                let adapter = self.adapter(collection).await?;
                adapter.save(records).await
            })
            .await?;

        if saved.len() < expected {
            return Err(self.backend_error(format!(
                "saved {} of {} records in {}",
                saved.len(),
                expected,
                collection
            )));
        }
        S::from_records(saved).ok_or_else(|| {
            self.backend_error(format!("save to {} returned no record", collection))
        })
    }

    /// Remove every record matched by the filter of `query`.
    ///
    /// Sort, skip, and limit are ignored: removal always targets the full
    /// match set.
    pub async fn remove(&self, collection: &str, query: Option<&Query>) -> CairnResult<Vec<Record>> {
        check_collection(collection)?;
        let filter = query.map(Query::without_window);
        self.serializer
            .run(self.key(collection), || async {
                let adapter = self.adapter(collection).await?;
                let records = or_empty(adapter.find().await)?;
                let matched = match &filter {
                    Some(filter) => filter.process(records)?,
                    None => records,
                };

                let mut removed = Vec::with_capacity(matched.len());
                for record in matched {
                    let Some(id) = record.id() else { continue };
                    if let Some(record) = or_none(adapter.remove_by_id(id).await)? {
                        removed.push(record);
                    }
                }
                debug!(collection, removed = removed.len(), "removed records");
                Ok(removed)
            })
            .await
    }

    /// Remove one record by id.
    ///
    /// A missing id (`null`, `""`, `false`, or `0`) returns `None` without
    /// touching storage; any other non-string id is rejected.
    pub async fn remove_by_id(
        &self,
        collection: &str,
        id: impl Into<Value>,
    ) -> CairnResult<Option<Record>> {
        check_collection(collection)?;
        let id = id.into();
        if is_falsy(&id) {
            return Ok(None);
        }
        let id = require_string_id("remove_by_id", id)?;
        self.serializer
            .run(self.key(collection), || async {
                let adapter = self.adapter(collection).await?;
                or_none(adapter.remove_by_id(&id).await)
            })
            .await
    }

    /// Remove every record in `collection`.
    pub async fn clear(&self, collection: &str) -> CairnResult<Vec<Record>> {
        self.remove(collection, None).await
    }

    // ------------------------------------------------------------------
    // Liveness
    // ------------------------------------------------------------------

    /// Write and delete one fixed record in the probe collection.
    pub(crate) async fn probe(&self) -> CairnResult<()> {
        self.serializer
            .run(self.key(PROBE_COLLECTION), || async {
                let adapter = self.adapter(PROBE_COLLECTION).await?;
                let mut record = Record::new().with(ID_FIELD, PROBE_ID);
                record.meta_mut().insert(LOCAL_FLAG.to_string(), Value::Bool(true));
                adapter.save(vec![record]).await?;
                or_none(adapter.remove_by_id(PROBE_ID).await)?;
                Ok(())
            })
            .await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn adapter(&self, collection: &str) -> CairnResult<Arc<dyn StorageAdapter>> {
        let mut adapters = self.adapters.lock().await;
        if let Some(adapter) = adapters.get(collection) {
            return Ok(Arc::clone(adapter));
        }
        let adapter = self.backend.open(collection).await?;
        adapters.insert(collection.to_string(), Arc::clone(&adapter));
        debug!(
            collection,
            technology = %self.technology(),
            "opened collection adapter"
        );
        Ok(adapter)
    }

    async fn load_all(&self, collection: &str) -> CairnResult<Vec<Record>> {
        let adapter = self.adapter(collection).await?;
        or_empty(adapter.find().await)
    }

    fn prepare(&self, mut record: Record) -> CairnResult<Record> {
        let needs_id = match record.get(ID_FIELD) {
            None | Some(Value::Null) => true,
            Some(Value::String(id)) => id.is_empty(),
            Some(other) => return Err(invalid_id("save", other)),
        };
        if needs_id {
            record.set_id(generate_id(self.id_length));
            record
                .meta_mut()
                .insert(LOCAL_FLAG.to_string(), Value::Bool(true));
        } else {
            record.meta_mut();
        }
        Ok(record)
    }

    fn backend_error(&self, reason: String) -> CairnError {
        StorageError::Backend {
            technology: self.technology().to_string(),
            reason,
        }
        .into()
    }
}

fn check_collection(collection: &str) -> CairnResult<()> {
    if collection.trim().is_empty() {
        return Err(ValidationError::InvalidCollection {
            collection: collection.to_string(),
            reason: "must not be empty".to_string(),
        }
        .into());
    }
    if is_reserved_collection(collection) {
        return Err(ValidationError::ReservedCollection {
            collection: collection.to_string(),
        }
        .into());
    }
    Ok(())
}

fn invalid_id(operation: &str, got: &Value) -> CairnError {
    ValidationError::InvalidId {
        operation: operation.to_string(),
        got: got.to_string(),
    }
    .into()
}

fn require_string_id(operation: &str, id: Value) -> CairnResult<String> {
    match id {
        Value::String(id) => Ok(id),
        other => Err(invalid_id(operation, &other)),
    }
}

fn is_falsy(id: &Value) -> bool {
    match id {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn or_empty(result: CairnResult<Vec<Record>>) -> CairnResult<Vec<Record>> {
    match result {
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        other => other,
    }
}

fn or_none(result: CairnResult<Record>) -> CairnResult<Option<Record>> {
    match result {
        Ok(record) => Ok(Some(record)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
