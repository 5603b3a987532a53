//! Cache configuration.
//!
//! Settings are loaded from environment variables with defaults that work
//! for development and tests.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CairnResult, ConfigError};
use crate::identity::DEFAULT_ID_LENGTH;
use crate::technology::StorageTechnology;

// ============================================================================
// CACHE SETTINGS
// ============================================================================

/// Process-wide cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Application identity; names the logical database.
    pub app_key: String,

    /// Root directory for on-disk backends.
    pub data_dir: PathBuf,

    /// Storage technologies in priority order.
    pub storage: Vec<StorageTechnology>,

    /// Length of generated record ids.
    pub id_length: usize,

    /// LMDB map size in megabytes.
    pub lmdb_map_size_mb: usize,

    /// Maximum number of named LMDB databases (one per collection).
    pub lmdb_max_collections: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            app_key: "default".to_string(),
            data_dir: std::env::temp_dir().join("cairn"),
            storage: vec![StorageTechnology::Memory],
            id_length: DEFAULT_ID_LENGTH,
            lmdb_map_size_mb: 64,
            lmdb_max_collections: 128,
        }
    }
}

impl CacheSettings {
    /// Create settings with default values.
    pub fn new(app_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            ..Self::default()
        }
    }

    /// Create CacheSettings from environment variables.
    ///
    /// Environment variables:
    /// - `CAIRN_APP_KEY`: Logical database name (default: "default")
    /// - `CAIRN_DATA_DIR`: Root directory for on-disk backends (default: `$TMPDIR/cairn`)
    /// - `CAIRN_STORAGE`: Comma-separated priority list (default: "memory")
    /// - `CAIRN_ID_LENGTH`: Generated id length (default: 24)
    /// - `CAIRN_LMDB_MAP_SIZE_MB`: LMDB map size (default: 64)
    /// - `CAIRN_LMDB_MAX_COLLECTIONS`: Named LMDB databases (default: 128)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let app_key = std::env::var("CAIRN_APP_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.app_key);

        let data_dir = std::env::var("CAIRN_DATA_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let storage = std::env::var("CAIRN_STORAGE")
            .ok()
            .map(|s| StorageTechnology::parse_list(&s))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.storage);

        let id_length = std::env::var("CAIRN_ID_LENGTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.id_length);

        let lmdb_map_size_mb = std::env::var("CAIRN_LMDB_MAP_SIZE_MB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.lmdb_map_size_mb);

        let lmdb_max_collections = std::env::var("CAIRN_LMDB_MAX_COLLECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.lmdb_max_collections);

        Self {
            app_key,
            data_dir,
            storage,
            id_length,
            lmdb_map_size_mb,
            lmdb_max_collections,
        }
    }

    /// Set the root directory for on-disk backends.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the storage priority list.
    pub fn with_storage(mut self, storage: Vec<StorageTechnology>) -> Self {
        self.storage = storage;
        self
    }

    /// Set the generated id length.
    pub fn with_id_length(mut self, length: usize) -> Self {
        self.id_length = length;
        self
    }

    /// Set the LMDB map size.
    pub fn with_lmdb_map_size(mut self, megabytes: usize) -> Self {
        self.lmdb_map_size_mb = megabytes;
        self
    }

    /// Directory reserved for one technology under this app's data dir.
    pub fn backend_dir(&self, technology: &StorageTechnology) -> PathBuf {
        self.data_dir
            .join(&self.app_key)
            .join(technology.as_str().to_ascii_lowercase())
    }

    /// Check the settings for values no backend can work with.
    pub fn validate(&self) -> CairnResult<()> {
        if self.app_key.trim().is_empty() {
            return Err(invalid("app_key", &self.app_key, "must not be empty"));
        }
        if self.app_key.contains(['/', '\\']) {
            return Err(invalid("app_key", &self.app_key, "must not contain path separators"));
        }
        if matches!(self.app_key.as_str(), "." | "..") {
            return Err(invalid("app_key", &self.app_key, "must name a directory"));
        }
        if self.id_length == 0 {
            return Err(invalid("id_length", "0", "must be positive"));
        }
        if self.lmdb_map_size_mb == 0 {
            return Err(invalid("lmdb_map_size_mb", "0", "must be positive"));
        }
        if self.storage.is_empty() {
            return Err(ConfigError::EmptyPriorityList.into());
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::error::CairnError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CairnError;

    #[test]
    fn test_default_settings() {
        let settings = CacheSettings::default();
        assert_eq!(settings.app_key, "default");
        assert_eq!(settings.id_length, 24);
        assert_eq!(settings.storage, vec![StorageTechnology::Memory]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let settings = CacheSettings::new("kid_app")
            .with_data_dir("/tmp/x")
            .with_storage(vec![StorageTechnology::Sqlite])
            .with_id_length(12)
            .with_lmdb_map_size(8);
        assert_eq!(settings.app_key, "kid_app");
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(settings.storage, vec![StorageTechnology::Sqlite]);
        assert_eq!(settings.id_length, 12);
        assert_eq!(settings.lmdb_map_size_mb, 8);
    }

    #[test]
    fn test_backend_dir_is_scoped_by_app_key() {
        let settings = CacheSettings::new("app").with_data_dir("/data");
        assert_eq!(
            settings.backend_dir(&StorageTechnology::Lmdb),
            PathBuf::from("/data/app/lmdb")
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty_key = CacheSettings::new("  ");
        assert!(matches!(empty_key.validate(), Err(CairnError::Config(_))));

        let separator = CacheSettings::new("a/b");
        assert!(separator.validate().is_err());

        for relative in [".", ".."] {
            assert!(matches!(
                CacheSettings::new(relative).validate(),
                Err(CairnError::Config(ConfigError::InvalidValue { .. }))
            ));
        }

        let zero_len = CacheSettings::default().with_id_length(0);
        assert!(zero_len.validate().is_err());

        let no_storage = CacheSettings::default().with_storage(vec![]);
        assert_eq!(
            no_storage.validate(),
            Err(ConfigError::EmptyPriorityList.into())
        );
    }

    #[test]
    fn test_from_env_falls_back_to_defaults() {
        // Only asserts on values no other test sets.
        let settings = CacheSettings::from_env();
        assert!(settings.id_length > 0);
        assert!(!settings.storage.is_empty());
    }
}
