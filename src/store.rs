//! Store — the explicit context owning the collection registry, the key
//! metadata and configuration.
//!
//! Collections are shared as `Arc<Mutex<IndexedCollection>>`. The internal
//! metadata collection is registered at construction and hidden from
//! [`Store::user_collections`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::collection::{IndexedCollection, DEFAULT_CHANGE_CAPACITY};
use crate::error::{Result, ValidationError};
use crate::keys::{metadata_model, CollectionMetadata, KeyMetadataStore, METADATA_COLLECTION};
use crate::model::{validate_model, CollectionModel};
use crate::persist::{PersistOptions, PersistSettings};

/// Shared handle to one collection.
pub type CollectionHandle = Arc<Mutex<IndexedCollection>>;

// ============================================================================
// StoreConfig
// ============================================================================

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Ring-buffer capacity of each collection's change tracker.
    pub change_buffer_capacity: usize,
    /// Defaults for persist/restore calls that do not pass their own.
    pub persist: PersistOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            change_buffer_capacity: DEFAULT_CHANGE_CAPACITY,
            persist: PersistOptions::default(),
        }
    }
}

/// Serializable form of [`StoreConfig`] (closures excluded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    pub change_buffer_capacity: usize,
    pub persist: PersistSettings,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            change_buffer_capacity: DEFAULT_CHANGE_CAPACITY,
            persist: PersistSettings::default(),
        }
    }
}

impl From<StoreSettings> for StoreConfig {
    fn from(s: StoreSettings) -> Self {
        Self {
            change_buffer_capacity: s.change_buffer_capacity,
            persist: s.persist.into(),
        }
    }
}

// ============================================================================
// Store
// ============================================================================

pub struct Store {
    config: StoreConfig,
    keys: Arc<KeyMetadataStore>,
    metadata: CollectionHandle,
    collections: RwLock<BTreeMap<String, CollectionHandle>>,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        let keys = Arc::new(KeyMetadataStore::new());
        let metadata = Arc::new(Mutex::new(IndexedCollection::new(
            metadata_model(),
            &keys,
            config.change_buffer_capacity,
        )));
        let mut collections = BTreeMap::new();
        collections.insert(METADATA_COLLECTION.to_string(), Arc::clone(&metadata));
        Self {
            config,
            keys,
            metadata,
            collections: RwLock::new(collections),
        }
    }

    /// Build a store and register one collection per model.
    pub fn with_models(config: StoreConfig, models: Vec<CollectionModel>) -> Result<Self> {
        let store = Self::new(config);
        for model in models {
            store.add_collection(model)?;
        }
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn keys(&self) -> &Arc<KeyMetadataStore> {
        &self.keys
    }

    /// Register a collection for `model`.
    pub fn add_collection(&self, model: CollectionModel) -> Result<CollectionHandle> {
        validate_model(&model)?;
        let mut collections = self.collections.write();
        if collections.contains_key(&model.name) {
            return Err(ValidationError::new(
                model.name.as_str(),
                "an unregistered collection name",
                "a name already in use",
            )
            .into());
        }
        let name = model.name.clone();
        let handle = Arc::new(Mutex::new(IndexedCollection::new(
            model,
            &self.keys,
            self.config.change_buffer_capacity,
        )));
        collections.insert(name, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn collection(&self, name: &str) -> Option<CollectionHandle> {
        self.collections.read().get(name).cloned()
    }

    /// The internal key-metadata collection.
    pub fn metadata(&self) -> &CollectionHandle {
        &self.metadata
    }

    /// Delete a collection, its listeners and its key counters. The
    /// metadata collection cannot be removed.
    pub fn remove_collection(&self, name: &str) -> bool {
        if name == METADATA_COLLECTION {
            return false;
        }
        let Some(handle) = self.collections.write().remove(name) else {
            return false;
        };
        handle.lock().teardown();
        self.keys.remove_collection(name);
        let stale = CollectionMetadata {
            collection_name: name.to_string(),
            entries: Vec::new(),
        };
        self.metadata.lock().remove_if_present(&stale.to_document());
        true
    }

    /// Every registered name, metadata collection included.
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// Registered collections other than the metadata collection.
    pub fn user_collections(&self) -> Vec<(String, CollectionHandle)> {
        self.collections
            .read()
            .iter()
            .filter(|(name, _)| name.as_str() != METADATA_COLLECTION)
            .map(|(name, handle)| (name.clone(), Arc::clone(handle)))
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("collections", &self.collection_names())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
