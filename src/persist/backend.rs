//! The capability surface every storage engine implements.
//!
//! Two shapes are supported by the same trait: object-store engines keep
//! `{key, data}` pairs per named store and may ignore the column spec;
//! relational engines create a two-column table named after the collection
//! using the spec's key and data column names.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;

/// One stored row: the canonical primary key and the serialized document.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: String,
    pub data: Value,
}

impl Row {
    pub fn new(key: impl Into<String>, data: Value) -> Self {
        Self {
            key: key.into(),
            data,
        }
    }
}

/// Key and data column names of a relational table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub key_column: String,
    pub data_column: String,
}

impl ColumnSpec {
    pub fn new(key_column: impl Into<String>, data_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            data_column: data_column.into(),
        }
    }
}

/// A table (or object store) as reported by [`StorageBackend::list_tables`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub schema: ColumnSpec,
}

/// Storage engine used by the persistence coordinator.
///
/// Implementations must be `Send + Sync`; the coordinator may call them for
/// different tables concurrently, but never issues two calls for the same
/// table at once.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Cheap reachability check. A failure here aborts the whole
    /// persist/restore call instead of being recorded per collection.
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, StorageError>;

    async fn create_table_if_missing(
        &self,
        name: &str,
        columns: &ColumnSpec,
    ) -> Result<(), StorageError>;

    /// Drop `name`. Dropping a missing table is not an error.
    async fn drop_table(&self, name: &str) -> Result<(), StorageError>;

    /// Append `rows` to `name`; a row whose key already exists replaces it.
    async fn insert_rows(
        &self,
        name: &str,
        columns: &ColumnSpec,
        rows: &[Row],
    ) -> Result<(), StorageError>;

    /// Every row of `name`. A missing table yields no rows.
    async fn query(&self, name: &str, columns: &ColumnSpec) -> Result<Vec<Row>, StorageError>;
}
