//! Storage provider selection.
//!
//! The [`ProviderSelector`] walks a priority list of storage technologies,
//! builds each candidate backend, checks that it is supported, and proves it
//! with a write/delete probe. The first candidate that passes becomes the
//! resolved provider. The outcome (success or failure) is memoized for the
//! lifetime of the selector.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cairn_core::{
    CacheSettings, CairnResult, ConfigError, EnvironmentError, StorageTechnology,
};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::adapter::StorageBackend;
use crate::backends;
use crate::engine::CacheEngine;
use crate::serializer::OperationSerializer;

/// Constructs a backend for one technology from the cache settings.
pub type BackendBuilder =
    Arc<dyn Fn(&CacheSettings) -> CairnResult<Arc<dyn StorageBackend>> + Send + Sync>;

/// Mapping from technology identifier to backend builder.
#[derive(Clone, Default)]
pub struct TechnologyRegistry {
    builders: HashMap<StorageTechnology, BackendBuilder>,
}

impl std::fmt::Debug for TechnologyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TechnologyRegistry")
            .field("technologies", &self.technologies())
            .finish()
    }
}

impl TechnologyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry mapping every built-in technology to its backend.
    pub fn with_defaults() -> Self {
        Self::new()
            .with(StorageTechnology::Memory, backends::build_memory)
            .with(StorageTechnology::LocalStorage, backends::build_local_file)
            .with(StorageTechnology::Lmdb, backends::build_lmdb)
            .with(StorageTechnology::Sqlite, backends::build_sqlite)
    }

    /// Add or replace the builder for `technology`.
    pub fn register<F>(&mut self, technology: StorageTechnology, builder: F)
    where
        F: Fn(&CacheSettings) -> CairnResult<Arc<dyn StorageBackend>> + Send + Sync + 'static,
    {
        self.builders.insert(technology, Arc::new(builder));
    }

    pub fn with<F>(mut self, technology: StorageTechnology, builder: F) -> Self
    where
        F: Fn(&CacheSettings) -> CairnResult<Arc<dyn StorageBackend>> + Send + Sync + 'static,
    {
        self.register(technology, builder);
        self
    }

    pub fn get(&self, technology: &StorageTechnology) -> Option<BackendBuilder> {
        self.builders.get(technology).cloned()
    }

    pub fn remove(&mut self, technology: &StorageTechnology) -> Option<BackendBuilder> {
        self.builders.remove(technology)
    }

    pub fn contains(&self, technology: &StorageTechnology) -> bool {
        self.builders.contains_key(technology)
    }

    /// Registered technologies, sorted.
    pub fn technologies(&self) -> Vec<StorageTechnology> {
        let mut technologies: Vec<_> = self.builders.keys().cloned().collect();
        technologies.sort();
        technologies
    }
}

/// Picks the storage technology the cache runs on.
///
/// # Example
///
/// ```ignore
/// use cairn_storage::ProviderSelector;
/// use cairn_core::{CacheSettings, StorageTechnology};
///
/// let selector = ProviderSelector::new(CacheSettings::from_env())?;
/// let engine = selector
///     .resolve(&[StorageTechnology::Lmdb, StorageTechnology::Memory])
///     .await?;
/// engine.save("notes", record).await?;
/// ```
pub struct ProviderSelector {
    settings: CacheSettings,
    registry: RwLock<TechnologyRegistry>,
    serializer: OperationSerializer,
    resolved: OnceCell<CairnResult<Arc<CacheEngine>>>,
}

impl std::fmt::Debug for ProviderSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSelector")
            .field("settings", &self.settings)
            .field("registry", &*self.read_registry())
            .field("resolved", &self.resolved.get())
            .finish()
    }
}

impl ProviderSelector {
    /// Create a selector with the built-in technologies registered.
    pub fn new(settings: CacheSettings) -> CairnResult<Self> {
        Self::with_registry(settings, TechnologyRegistry::with_defaults())
    }

    /// Create a selector with a custom registry.
    pub fn with_registry(settings: CacheSettings, registry: TechnologyRegistry) -> CairnResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            registry: RwLock::new(registry),
            serializer: OperationSerializer::new(),
            resolved: OnceCell::new(),
        })
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Serializer shared by every engine this selector builds.
    pub fn serializer(&self) -> &OperationSerializer {
        &self.serializer
    }

    /// Replace the whole technology mapping.
    ///
    /// Has no effect on a resolution that has already happened.
    pub fn set_technologies(&self, registry: TechnologyRegistry) {
        *self.write_registry() = registry;
    }

    /// Add or replace one technology.
    pub fn register<F>(&self, technology: StorageTechnology, builder: F)
    where
        F: Fn(&CacheSettings) -> CairnResult<Arc<dyn StorageBackend>> + Send + Sync + 'static,
    {
        self.write_registry().register(technology, builder);
    }

    pub fn technologies(&self) -> Vec<StorageTechnology> {
        self.read_registry().technologies()
    }

    /// Resolve the provider, probing `priority` in order on the first call.
    ///
    /// Every later call returns the memoized outcome, whatever list it passes.
    /// Concurrent first callers share one resolution.
    pub async fn resolve(&self, priority: &[StorageTechnology]) -> CairnResult<Arc<CacheEngine>> {
        self.resolved
            .get_or_init(|| self.select(priority))
            .await
            .clone()
    }

    /// Resolve using the priority list from the settings.
    pub async fn resolve_default(&self) -> CairnResult<Arc<CacheEngine>> {
        self.resolve(&self.settings.storage).await
    }

    /// The resolved engine, if resolution already ran and succeeded.
    pub fn resolved(&self) -> Option<Arc<CacheEngine>> {
        self.resolved
            .get()
            .and_then(|outcome| outcome.as_ref().ok())
            .cloned()
    }

    async fn select(&self, priority: &[StorageTechnology]) -> CairnResult<Arc<CacheEngine>> {
        if priority.is_empty() {
            return Err(ConfigError::EmptyPriorityList.into());
        }

        let mut tried = Vec::with_capacity(priority.len());
        for technology in priority {
            let Some(builder) = self.read_registry().get(technology) else {
                return Err(ConfigError::UnsupportedTechnology {
                    technology: technology.to_string(),
                }
                .into());
            };
            tried.push(technology.to_string());

            match self.try_candidate(&builder).await {
                Ok(Some(engine)) => {
                    info!(
                        technology = %technology,
                        database = engine.database(),
                        "storage provider selected"
                    );
                    return Ok(engine);
                }
                Ok(None) => {
                    warn!(technology = %technology, "storage technology not supported here");
                }
                Err(e) => {
                    warn!(technology = %technology, error = %e, "storage probe failed");
                }
            }
        }

        Err(EnvironmentError::NoSupportedTechnology { tried }.into())
    }

    /// Build, check, and probe one candidate. `Ok(None)` if unsupported.
    async fn try_candidate(&self, builder: &BackendBuilder) -> CairnResult<Option<Arc<CacheEngine>>> {
        let backend = builder(&self.settings)?;
        if !backend.is_supported().await {
            return Ok(None);
        }
        let engine = CacheEngine::new(backend, self.serializer.clone(), &self.settings);
        engine.probe().await?;
        debug!(technology = %engine.technology(), "probe succeeded");
        Ok(Some(Arc::new(engine)))
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, TechnologyRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, TechnologyRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}
