//! CAIRN Test Utilities
//!
//! Shared test infrastructure for the CAIRN workspace:
//! - Proptest generators for records and technologies
//! - Backends that fail in controlled ways
//! - Fixtures for common scenarios
//! - Custom assertions for CAIRN error variants

pub use cairn_core::{
    CacheSettings, CairnError, CairnResult, ConfigError, EnvironmentError, Record, StorageError,
    StorageTechnology, ValidationError,
};
pub use cairn_storage::{
    CacheEngine, OperationSerializer, ProviderSelector, StorageAdapter, StorageBackend,
    TechnologyRegistry,
};

use std::sync::Arc;

use async_trait::async_trait;

// ============================================================================
// CONTROLLED BACKENDS
// ============================================================================

/// A backend that reports itself supported but whose every adapter call
/// fails with a backend error.
#[derive(Debug, Clone)]
pub struct FailingBackend {
    name: String,
}

impl FailingBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn error(&self, reason: &str) -> CairnError {
        StorageError::Backend {
            technology: self.name.clone(),
            reason: reason.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl StorageBackend for FailingBackend {
    fn technology(&self) -> StorageTechnology {
        StorageTechnology::Custom(self.name.clone())
    }

    fn database(&self) -> &str {
        "failing"
    }

    async fn is_supported(&self) -> bool {
        true
    }

    async fn open(&self, collection: &str) -> CairnResult<Arc<dyn StorageAdapter>> {
        Ok(Arc::new(FailingAdapter {
            collection: collection.to_string(),
            backend: self.clone(),
        }))
    }
}

/// Adapter handed out by [`FailingBackend`].
#[derive(Debug)]
pub struct FailingAdapter {
    collection: String,
    backend: FailingBackend,
}

#[async_trait]
impl StorageAdapter for FailingAdapter {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn find(&self) -> CairnResult<Vec<Record>> {
        Err(self.backend.error("find failed"))
    }

    async fn find_by_id(&self, _id: &str) -> CairnResult<Record> {
        Err(self.backend.error("find_by_id failed"))
    }

    async fn save(&self, _records: Vec<Record>) -> CairnResult<Vec<Record>> {
        Err(self.backend.error("write refused"))
    }

    async fn remove_by_id(&self, _id: &str) -> CairnResult<Record> {
        Err(self.backend.error("remove failed"))
    }
}

/// A backend that is never supported. Opening it is a test bug.
#[derive(Debug, Clone)]
pub struct UnsupportedBackend {
    name: String,
}

impl UnsupportedBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl StorageBackend for UnsupportedBackend {
    fn technology(&self) -> StorageTechnology {
        StorageTechnology::Custom(self.name.clone())
    }

    fn database(&self) -> &str {
        "unsupported"
    }

    async fn is_supported(&self) -> bool {
        false
    }

    async fn open(&self, collection: &str) -> CairnResult<Arc<dyn StorageAdapter>> {
        panic!("opened {} on an unsupported backend", collection)
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating CAIRN records.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// A user field name (never one of the reserved `_` fields).
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,7}"
    }

    /// A scalar JSON value.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        ]
    }

    /// A record with no id or metadata.
    pub fn arb_unkeyed_record() -> impl Strategy<Value = Record> {
        prop::collection::btree_map(arb_field_name(), arb_scalar(), 0..6).prop_map(|fields| {
            Record::from(fields.into_iter().collect::<Map<String, Value>>())
        })
    }

    /// A record carrying a caller-chosen string id.
    pub fn arb_keyed_record() -> impl Strategy<Value = Record> {
        ("[a-z0-9]{1,12}", arb_unkeyed_record()).prop_map(|(id, mut record)| {
            record.set_id(id);
            record
        })
    }

    /// Either kind of record.
    pub fn arb_record() -> impl Strategy<Value = Record> {
        prop_oneof![arb_unkeyed_record(), arb_keyed_record()]
    }

    /// A built-in technology.
    pub fn arb_builtin_technology() -> impl Strategy<Value = StorageTechnology> {
        prop::sample::select(StorageTechnology::BUILTIN.to_vec())
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made settings, registries, and engines.

    use super::*;
    use cairn_storage::backends;
    use tempfile::TempDir;

    /// Name under which [`failing_registry`] registers [`FailingBackend`].
    pub const FAILING: &str = "Failing";

    /// Name under which [`failing_registry`] registers [`UnsupportedBackend`].
    pub const UNSUPPORTED: &str = "Unsupported";

    pub fn failing() -> StorageTechnology {
        StorageTechnology::Custom(FAILING.to_string())
    }

    pub fn unsupported() -> StorageTechnology {
        StorageTechnology::Custom(UNSUPPORTED.to_string())
    }

    /// Settings whose on-disk backends live under `dir`.
    pub fn temp_settings(dir: &TempDir) -> CacheSettings {
        CacheSettings::new("test-app").with_data_dir(dir.path())
    }

    /// Only `Memory` plus the two misbehaving custom technologies.
    pub fn failing_registry() -> TechnologyRegistry {
        TechnologyRegistry::new()
            .with(StorageTechnology::Memory, backends::build_memory)
            .with(failing(), |_: &CacheSettings| {
                Ok(Arc::new(FailingBackend::new(FAILING)) as Arc<dyn StorageBackend>)
            })
            .with(unsupported(), |_: &CacheSettings| {
                Ok(Arc::new(UnsupportedBackend::new(UNSUPPORTED)) as Arc<dyn StorageBackend>)
            })
    }

    /// Selector over [`failing_registry`].
    pub fn failing_selector() -> ProviderSelector {
        ProviderSelector::with_registry(CacheSettings::new("test-app"), failing_registry())
            .expect("fixture settings are valid")
    }

    /// A fresh engine over an in-memory backend.
    pub fn memory_engine() -> CacheEngine {
        CacheEngine::new(
            Arc::new(cairn_storage::MemoryBackend::new("test-app")),
            OperationSerializer::new(),
            &CacheSettings::new("test-app"),
        )
    }

    /// An engine whose backend fails every call.
    pub fn failing_engine() -> CacheEngine {
        CacheEngine::new(
            Arc::new(FailingBackend::new(FAILING)),
            OperationSerializer::new(),
            &CacheSettings::new("test-app"),
        )
    }

    /// A note with no id.
    pub fn note(text: &str) -> Record {
        Record::new().with("text", text)
    }

    /// A note with a caller-chosen id.
    pub fn keyed_note(id: &str, text: &str) -> Record {
        note(text).with("_id", id)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertions for CAIRN results.

    use super::*;

    /// Assert that a CairnResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &CairnResult<T>) {
        match result {
            Err(CairnError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a CairnResult is an UnsupportedTechnology error naming `technology`.
    #[track_caller]
    pub fn assert_unsupported_technology<T: std::fmt::Debug>(
        result: &CairnResult<T>,
        technology: &str,
    ) {
        match result {
            Err(CairnError::Config(ConfigError::UnsupportedTechnology { technology: t })) => {
                assert_eq!(t, technology, "Wrong technology in UnsupportedTechnology error");
            }
            other => panic!(
                "Expected UnsupportedTechnology error for {}, got: {:?}",
                technology, other
            ),
        }
    }

    /// Assert that a CairnResult is an Environment error.
    #[track_caller]
    pub fn assert_environment_error<T: std::fmt::Debug>(result: &CairnResult<T>) {
        match result {
            Err(CairnError::Environment(_)) => {}
            other => panic!("Expected Environment error, got: {:?}", other),
        }
    }

    /// Assert that a CairnResult is a Validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &CairnResult<T>) {
        match result {
            Err(CairnError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that a CairnResult is a Storage error other than NotFound.
    #[track_caller]
    pub fn assert_backend_error<T: std::fmt::Debug>(result: &CairnResult<T>) {
        match result {
            Err(CairnError::Storage(StorageError::Backend { .. })) => {}
            other => panic!("Expected Storage backend error, got: {:?}", other),
        }
    }

    /// Assert that `id` is a lowercase hex id of `length` characters.
    #[track_caller]
    pub fn assert_hex_id(id: Option<&str>, length: usize) {
        match id {
            Some(id) => assert!(
                cairn_core::is_hex_id(id, length),
                "Expected {}-char lowercase hex id, got: {:?}",
                length,
                id
            ),
            None => panic!("Expected a generated id, got none"),
        }
    }
}
