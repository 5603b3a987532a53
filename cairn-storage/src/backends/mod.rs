//! Built-in storage backends.
//!
//! | Technology     | Backend              | Layout                               |
//! |----------------|----------------------|--------------------------------------|
//! | `Memory`       | [`MemoryBackend`]    | one map per collection               |
//! | `LocalStorage` | [`LocalFileBackend`] | one JSON document per collection     |
//! | `Lmdb`         | [`LmdbBackend`]      | one named LMDB database per collection |
//! | `Sqlite`       | [`SqliteBackend`]    | one table per collection             |
//!
//! The `build_*` functions construct a backend from [`CacheSettings`]; they
//! are what the default technology registry maps each built-in to.

mod lmdb;
mod local_file;
mod memory;
mod sqlite;

use std::sync::Arc;

use cairn_core::{CacheSettings, CairnResult, StorageTechnology};

use crate::adapter::StorageBackend;

pub use lmdb::{LmdbAdapter, LmdbBackend, LmdbError};
pub use local_file::{LocalFileAdapter, LocalFileBackend, LocalFileError};
pub use memory::{MemoryAdapter, MemoryBackend};
pub use sqlite::{SqliteAdapter, SqliteBackend, SqliteError};

/// Fresh in-memory backend for `settings.app_key`.
pub fn build_memory(settings: &CacheSettings) -> CairnResult<Arc<dyn StorageBackend>> {
    Ok(Arc::new(MemoryBackend::new(settings.app_key.clone())))
}

/// File-backed key-value backend under the app's `localstorage` directory.
pub fn build_local_file(settings: &CacheSettings) -> CairnResult<Arc<dyn StorageBackend>> {
    Ok(Arc::new(LocalFileBackend::new(
        settings.app_key.clone(),
        settings.backend_dir(&StorageTechnology::LocalStorage),
    )))
}

/// LMDB environment under the app's `lmdb` directory.
pub fn build_lmdb(settings: &CacheSettings) -> CairnResult<Arc<dyn StorageBackend>> {
    let backend = LmdbBackend::new(
        settings.app_key.clone(),
        settings.backend_dir(&StorageTechnology::Lmdb),
        settings.lmdb_map_size_mb,
        settings.lmdb_max_collections,
    )?;
    Ok(Arc::new(backend))
}

/// SQLite database file under the app's `sqlite` directory.
pub fn build_sqlite(settings: &CacheSettings) -> CairnResult<Arc<dyn StorageBackend>> {
    let backend = SqliteBackend::open_in_dir(
        settings.app_key.clone(),
        settings.backend_dir(&StorageTechnology::Sqlite),
    )?;
    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_builders_use_technology_dirs() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let settings = CacheSettings::new("app").with_data_dir(temp_dir.path());

        let builders: [(StorageTechnology, fn(&CacheSettings) -> CairnResult<Arc<dyn StorageBackend>>); 4] = [
            (StorageTechnology::Memory, build_memory),
            (StorageTechnology::LocalStorage, build_local_file),
            (StorageTechnology::Lmdb, build_lmdb),
            (StorageTechnology::Sqlite, build_sqlite),
        ];

        for (technology, build) in builders {
            let backend = build(&settings).expect("builder should succeed");
            assert_eq!(backend.technology(), technology);
            assert_eq!(backend.database(), "app");
            assert!(backend.is_supported().await, "{} should be supported", technology);
        }

        assert!(temp_dir.path().join("app").join("lmdb").is_dir());
        assert!(temp_dir.path().join("app").join("sqlite").join("app.sqlite3").is_file());
    }
}
