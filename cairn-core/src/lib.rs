//! CAIRN Core - Record, Query, and Configuration Types
//!
//! Pure data structures shared by every CAIRN crate. Storage backends,
//! the cache engine, and the provider selector live in `cairn-storage`.

pub mod aggregation;
pub mod error;
pub mod identity;
pub mod query;
pub mod record;
pub mod settings;
pub mod technology;

pub use aggregation::{Aggregation, AggregationProcessor, Reducer};
pub use error::{
    CairnError, CairnResult, ConfigError, EnvironmentError, StorageError, ValidationError,
};
pub use identity::{generate_id, is_hex_id, DEFAULT_ID_LENGTH};
pub use query::{FilterExpr, FilterOperator, Query, QueryProcessor, SortKey, SortOrder};
pub use record::{Record, ID_FIELD, LOCAL_FLAG, META_FIELD};
pub use settings::CacheSettings;
pub use technology::StorageTechnology;

/// Name of the collection used for liveness probes.
///
/// Never reachable through the public engine surface.
pub const PROBE_COLLECTION: &str = "__cairn_probe__";

/// Returns true when `collection` is reserved for internal use.
pub fn is_reserved_collection(collection: &str) -> bool {
    collection == PROBE_COLLECTION
}
