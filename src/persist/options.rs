//! Persist/restore configuration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::types::Document;

/// Rewrites a document on its way to (save) or from (load) storage.
pub type ItemTransformFn = dyn Fn(Document) -> Document + Send + Sync;

/// Called once per collection whose persist or restore failed.
pub type StorageErrorCallback = dyn Fn(&str, &PersistError) + Send + Sync;

/// Per-collection override: receives the collection name and the call's
/// default options, returns the options to use for that collection.
pub type CollectionOptionsFn = dyn Fn(&str, &PersistOptions) -> PersistOptions + Send + Sync;

pub const DEFAULT_MAX_OBJECTS_PER_CHUNK: usize = 1000;
pub const DEFAULT_KEY_COLUMN: &str = "key";
pub const DEFAULT_DATA_COLUMN: &str = "data";

/// Options for one persist or restore pass.
pub struct PersistOptions {
    /// Rows per `insert_rows` call (default 1000). Zero is treated as one.
    pub max_objects_per_chunk: usize,
    /// Key column for relational backends (default `"key"`).
    pub key_column_name: String,
    /// Data column for relational backends (default `"data"`).
    pub data_column_name: String,
    pub save_item_transform: Option<Arc<ItemTransformFn>>,
    pub load_item_transform: Option<Arc<ItemTransformFn>>,
    pub on_storage_error: Option<Arc<StorageErrorCallback>>,
}

impl PersistOptions {
    pub fn chunk_size(&self) -> usize {
        self.max_objects_per_chunk.max(1)
    }

    pub fn with_chunk_size(mut self, max_objects_per_chunk: usize) -> Self {
        self.max_objects_per_chunk = max_objects_per_chunk;
        self
    }

    pub fn with_columns(mut self, key: impl Into<String>, data: impl Into<String>) -> Self {
        self.key_column_name = key.into();
        self.data_column_name = data.into();
        self
    }

    pub fn with_save_transform(
        mut self,
        f: impl Fn(Document) -> Document + Send + Sync + 'static,
    ) -> Self {
        self.save_item_transform = Some(Arc::new(f));
        self
    }

    pub fn with_load_transform(
        mut self,
        f: impl Fn(Document) -> Document + Send + Sync + 'static,
    ) -> Self {
        self.load_item_transform = Some(Arc::new(f));
        self
    }

    pub fn with_on_storage_error(
        mut self,
        f: impl Fn(&str, &PersistError) + Send + Sync + 'static,
    ) -> Self {
        self.on_storage_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn save(&self, doc: Document) -> Document {
        match &self.save_item_transform {
            Some(f) => f(doc),
            None => doc,
        }
    }

    pub(crate) fn load(&self, doc: Document) -> Document {
        match &self.load_item_transform {
            Some(f) => f(doc),
            None => doc,
        }
    }

    pub(crate) fn report(&self, collection: &str, error: &PersistError) {
        if let Some(cb) = &self.on_storage_error {
            cb(collection, error);
        }
    }

    /// The serializable part of these options.
    pub fn settings(&self) -> PersistSettings {
        PersistSettings {
            max_objects_per_chunk: self.max_objects_per_chunk,
            key_column_name: self.key_column_name.clone(),
            data_column_name: self.data_column_name.clone(),
        }
    }
}

impl Default for PersistOptions {
    fn default() -> Self {
        PersistSettings::default().into()
    }
}

impl Clone for PersistOptions {
    fn clone(&self) -> Self {
        Self {
            max_objects_per_chunk: self.max_objects_per_chunk,
            key_column_name: self.key_column_name.clone(),
            data_column_name: self.data_column_name.clone(),
            save_item_transform: self.save_item_transform.clone(),
            load_item_transform: self.load_item_transform.clone(),
            on_storage_error: self.on_storage_error.clone(),
        }
    }
}

impl std::fmt::Debug for PersistOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistOptions")
            .field("max_objects_per_chunk", &self.max_objects_per_chunk)
            .field("key_column_name", &self.key_column_name)
            .field("data_column_name", &self.data_column_name)
            .field("save_item_transform", &self.save_item_transform.is_some())
            .field("load_item_transform", &self.load_item_transform.is_some())
            .field("on_storage_error", &self.on_storage_error.is_some())
            .finish()
    }
}

/// Serializable subset of [`PersistOptions`], suitable for config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistSettings {
    pub max_objects_per_chunk: usize,
    pub key_column_name: String,
    pub data_column_name: String,
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            max_objects_per_chunk: DEFAULT_MAX_OBJECTS_PER_CHUNK,
            key_column_name: DEFAULT_KEY_COLUMN.to_string(),
            data_column_name: DEFAULT_DATA_COLUMN.to_string(),
        }
    }
}

impl From<PersistSettings> for PersistOptions {
    fn from(s: PersistSettings) -> Self {
        Self {
            max_objects_per_chunk: s.max_objects_per_chunk,
            key_column_name: s.key_column_name,
            data_column_name: s.data_column_name,
            save_item_transform: None,
            load_item_transform: None,
            on_storage_error: None,
        }
    }
}
