//! Error types for CAIRN operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found in {collection}: {}", .id.as_deref().unwrap_or("<collection>"))]
    NotFound {
        collection: String,
        id: Option<String>,
    },

    #[error("{technology} backend failed: {reason}")]
    Backend { technology: String, reason: String },

    #[error("Serialization failed for {collection}: {reason}")]
    Serialization { collection: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{operation} requires a string id, got {got}")]
    InvalidId { operation: String, got: String },

    #[error("Collection {collection} is reserved")]
    ReservedCollection { collection: String },

    #[error("Invalid collection name {collection:?}: {reason}")]
    InvalidCollection { collection: String, reason: String },

    #[error("Invalid record: {reason}")]
    InvalidRecord { reason: String },

    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("Invalid aggregation: {reason}")]
    InvalidAggregation { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Storage technology not supported: {technology}")]
    UnsupportedTechnology { technology: String },

    #[error("Storage priority list is empty")]
    EmptyPriorityList,

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Runtime environment errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("No supported storage technology (tried: {})", .tried.join(", "))]
    NoSupportedTechnology { tried: Vec<String> },
}

/// Master error type for all CAIRN errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CairnError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),
}

impl CairnError {
    /// True for adapter-level not-found conditions.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CairnError::Storage(StorageError::NotFound { .. }))
    }
}

/// Result type alias for CAIRN operations.
pub type CairnResult<T> = Result<T, CairnError>;

// =============================================================================
// TESTS
// =============================================================================
