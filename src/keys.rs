//! Largest-key-issued bookkeeping for auto-generated fields.
//!
//! Every (collection, field) pair marked auto-generate has a counter holding
//! the largest key ever handed out. `next_key` advances it under the lock
//! before returning, so no caller can observe a stale maximum. Counters only
//! ever grow: explicit values written by callers and values seen on restore
//! raise them, nothing lowers them.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ValidationError, ValidationErrors};
use crate::model::{CollectionModel, FieldDef, FieldType};
use crate::types::Document;

/// Name of the internal collection that persists key metadata.
pub const METADATA_COLLECTION: &str = "_shelf_key_metadata";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntry {
    pub field_name: String,
    pub largest_key_issued: i64,
}

/// Persisted form of one collection's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    pub collection_name: String,
    pub entries: Vec<KeyEntry>,
}

impl CollectionMetadata {
    pub fn largest(&self, field: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|e| e.field_name == field)
            .map(|e| e.largest_key_issued)
    }

    pub fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Document::new(),
        }
    }

    pub fn from_document(doc: &Document) -> Result<Self, ValidationErrors> {
        serde_json::from_value(Value::Object(doc.clone())).map_err(|e| {
            ValidationErrors::single(ValidationError::new(
                METADATA_COLLECTION,
                "collection metadata document",
                e.to_string(),
            ))
        })
    }
}

/// Model of the metadata collection itself.
pub fn metadata_model() -> CollectionModel {
    CollectionModel {
        name: METADATA_COLLECTION.to_string(),
        fields: vec![
            FieldDef::new("collectionName", FieldType::String).primary_key(),
            FieldDef::new("entries", FieldType::Json).required(),
        ],
    }
}

// ============================================================================
// KeyMetadataStore
// ============================================================================

#[derive(Debug, Default)]
pub struct KeyMetadataStore {
    /// collection → field → largest key issued
    maxima: Mutex<BTreeMap<String, BTreeMap<String, i64>>>,
}

impl KeyMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create zeroed counters for `fields`; existing counters are kept.
    pub fn register(&self, collection: &str, fields: &[&str]) {
        let mut maxima = self.maxima.lock();
        let entry = maxima.entry(collection.to_string()).or_default();
        for field in fields {
            entry.entry((*field).to_string()).or_insert(0);
        }
    }

    pub fn remove_collection(&self, collection: &str) {
        self.maxima.lock().remove(collection);
    }

    /// Issue the next key for (collection, field).
    pub fn next_key(&self, collection: &str, field: &str) -> i64 {
        let mut maxima = self.maxima.lock();
        let max = maxima
            .entry(collection.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert(0);
        *max += 1;
        *max
    }

    /// Raise the counter to `value` if it is larger.
    pub fn observe(&self, collection: &str, field: &str, value: i64) {
        let mut maxima = self.maxima.lock();
        let max = maxima
            .entry(collection.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert(0);
        if value > *max {
            *max = value;
        }
    }

    pub fn largest(&self, collection: &str, field: &str) -> Option<i64> {
        self.maxima
            .lock()
            .get(collection)
            .and_then(|fields| fields.get(field))
            .copied()
    }

    pub fn snapshot(&self, collection: &str) -> CollectionMetadata {
        let maxima = self.maxima.lock();
        let entries = maxima
            .get(collection)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(f, max)| KeyEntry {
                        field_name: f.clone(),
                        largest_key_issued: *max,
                    })
                    .collect()
            })
            .unwrap_or_default();
        CollectionMetadata {
            collection_name: collection.to_string(),
            entries,
        }
    }

    /// Bring a counter up to date after a restore: the result is the largest
    /// of the current counter, the stored maximum and the maximum observed
    /// in restored documents.
    pub fn reconcile(&self, collection: &str, field: &str, stored: Option<i64>, observed: Option<i64>) {
        let target = stored.into_iter().chain(observed).max().unwrap_or(0);
        self.observe(collection, field, target);
    }
}

// ============================================================================
// Tests
// ============================================================================
