//! CAIRN Storage - Backends, Cache Engine, and Provider Selection
//!
//! Persists, queries, and reconciles records on-device. A
//! [`ProviderSelector`] probes the available storage technologies and
//! commits to the first one that works; the resulting [`CacheEngine`] offers
//! the same CRUD surface whatever technology sits behind it, with every
//! operation on a collection serialized through one [`OperationSerializer`].

pub mod adapter;
pub mod backends;
pub mod engine;
pub mod request;
pub mod selector;
pub mod serializer;

pub use adapter::{StorageAdapter, StorageBackend};
pub use backends::{LmdbBackend, LocalFileBackend, MemoryBackend, SqliteBackend};
pub use engine::{CacheEngine, CountResult, SaveInput};
pub use request::{execute, CacheRequest, CacheResponse, RequestMethod};
pub use selector::{BackendBuilder, ProviderSelector, TechnologyRegistry};
pub use serializer::OperationSerializer;
