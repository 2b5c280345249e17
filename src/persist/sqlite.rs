//! SQLite storage backend.
//!
//! Relational flavour of [`StorageBackend`]: every collection becomes a
//! two-column table (`key TEXT PRIMARY KEY`, `data TEXT`) using the column
//! names from the call's [`ColumnSpec`]. Documents are stored as JSON text.
//! The connection is guarded by a `parking_lot::Mutex`; SQLite calls are
//! short and run inline on the calling task.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};

use crate::error::StorageError;

use super::backend::{ColumnSpec, Row, StorageBackend, TableInfo};

/// Quote an identifier for interpolation into SQL.
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub struct SqliteBackend {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteBackend {
    /// Open a file-backed SQLite database.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn table_exists(conn: &rusqlite::Connection, name: &str) -> Result<bool, StorageError> {
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn columns_of(conn: &rusqlite::Connection, name: &str) -> Result<ColumnSpec, StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(name)))?;
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;
        match columns.as_slice() {
            [key, data, ..] => Ok(ColumnSpec::new(key.clone(), data.clone())),
            _ => Err(StorageError::Backend {
                table: name.to_string(),
                message: format!("expected key and data columns, found {columns:?}"),
            }),
        }
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn ping(&self) -> Result<(), StorageError> {
        self.conn.lock().query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, StorageError> {
        let conn = self.conn.lock();
        let names: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        names
            .into_iter()
            .map(|name| -> Result<TableInfo, StorageError> {
                let schema = Self::columns_of(&conn, &name)?;
                Ok(TableInfo { name, schema })
            })
            .collect()
    }

    async fn create_table_if_missing(
        &self,
        name: &str,
        columns: &ColumnSpec,
    ) -> Result<(), StorageError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({} TEXT PRIMARY KEY NOT NULL, {} TEXT NOT NULL)",
            quote(name),
            quote(&columns.key_column),
            quote(&columns.data_column),
        );
        self.conn.lock().execute_batch(&sql)?;
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(name)))?;
        Ok(())
    }

    async fn insert_rows(
        &self,
        name: &str,
        columns: &ColumnSpec,
        rows: &[Row],
    ) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}, {}) VALUES (?1, ?2)",
            quote(name),
            quote(&columns.key_column),
            quote(&columns.data_column),
        );
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(params![row.key, row.data.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn query(&self, name: &str, columns: &ColumnSpec) -> Result<Vec<Row>, StorageError> {
        let conn = self.conn.lock();
        if !Self::table_exists(&conn, name)? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {}, {} FROM {} ORDER BY rowid",
            quote(&columns.key_column),
            quote(&columns.data_column),
            quote(name),
        );
        let mut stmt = conn.prepare(&sql)?;
        let raw: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        raw.into_iter()
            .map(|(key, text)| -> Result<Row, StorageError> {
                let data = serde_json::from_str(&text).map_err(|e| StorageError::Corruption {
                    table: name.to_string(),
                    key: key.clone(),
                    source: Some(e),
                })?;
                Ok(Row { key, data })
            })
            .collect()
    }
}
