//! Durable persistence of a [`Store`](crate::store::Store).
//!
//! - [`backend`] — the [`StorageBackend`] capability surface.
//! - [`options`] — [`PersistOptions`] and per-collection overrides.
//! - [`coordinator`] — [`PersistenceCoordinator`]: chunked persist/restore.
//! - [`memory`] — [`MemoryBackend`], an in-process object store.
//! - `sqlite` — `SqliteBackend`, relational tables (feature `sqlite`).

pub mod backend;
pub mod coordinator;
pub mod memory;
pub mod options;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use backend::{ColumnSpec, Row, StorageBackend, TableInfo};
pub use coordinator::PersistenceCoordinator;
pub use memory::MemoryBackend;
pub use options::{
    CollectionOptionsFn, ItemTransformFn, PersistOptions, PersistSettings, StorageErrorCallback,
    DEFAULT_MAX_OBJECTS_PER_CHUNK,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
