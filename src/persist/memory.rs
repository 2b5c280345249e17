//! In-process object-store backend.
//!
//! Each table is a keyed map of JSON blobs, in the manner of a browser
//! object store. Column specs are recorded for `list_tables` but otherwise
//! ignored. An optional row quota makes quota exhaustion reproducible.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StorageError;

use super::backend::{ColumnSpec, Row, StorageBackend, TableInfo};

#[derive(Debug, Default)]
struct Table {
    schema: Option<ColumnSpec>,
    rows: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<BTreeMap<String, Table>>,
    row_quota: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any insert that would leave more than `quota` rows stored
    /// across all tables.
    pub fn with_row_quota(quota: usize) -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            row_quota: Some(quota),
        }
    }

    /// Rows currently stored across all tables.
    pub fn total_rows(&self) -> usize {
        self.tables.lock().values().map(|t| t.rows.len()).sum()
    }

    pub fn table_len(&self, name: &str) -> Option<usize> {
        self.tables.lock().get(name).map(|t| t.rows.len())
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.lock().contains_key(name)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, StorageError> {
        Ok(self
            .tables
            .lock()
            .iter()
            .map(|(name, t)| TableInfo {
                name: name.clone(),
                schema: t
                    .schema
                    .clone()
                    .unwrap_or_else(|| ColumnSpec::new("key", "data")),
            })
            .collect())
    }

    async fn create_table_if_missing(
        &self,
        name: &str,
        columns: &ColumnSpec,
    ) -> Result<(), StorageError> {
        self.tables
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Table {
                schema: Some(columns.clone()),
                rows: BTreeMap::new(),
            });
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> Result<(), StorageError> {
        self.tables.lock().remove(name);
        Ok(())
    }

    async fn insert_rows(
        &self,
        name: &str,
        _columns: &ColumnSpec,
        rows: &[Row],
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.lock();

        if let Some(quota) = self.row_quota {
            let existing: usize = tables.values().map(|t| t.rows.len()).sum();
            let new_keys = match tables.get(name) {
                Some(t) => rows.iter().filter(|r| !t.rows.contains_key(&r.key)).count(),
                None => rows.len(),
            };
            if existing + new_keys > quota {
                return Err(StorageError::QuotaExceeded {
                    table: name.to_string(),
                });
            }
        }

        let table = tables.get_mut(name).ok_or_else(|| StorageError::Backend {
            table: name.to_string(),
            message: "no such object store".to_string(),
        })?;
        for row in rows {
            table.rows.insert(row.key.clone(), row.data.clone());
        }
        Ok(())
    }

    async fn query(&self, name: &str, _columns: &ColumnSpec) -> Result<Vec<Row>, StorageError> {
        Ok(self
            .tables
            .lock()
            .get(name)
            .map(|t| {
                t.rows
                    .iter()
                    .map(|(k, v)| Row::new(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
