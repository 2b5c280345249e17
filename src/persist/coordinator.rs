//! PersistenceCoordinator — chunked save/restore of a [`Store`] against a
//! [`StorageBackend`].
//!
//! Per-collection work is fanned out and joined. Each collection's storage
//! calls are serialized by a per-collection async lock; a second operation
//! on a collection that is already in flight fails fast with
//! `ConcurrentOperation` instead of queueing.
//!
//! Failures are recorded per collection in the aggregate result. Only a
//! backend that cannot be reached at all (ping or table listing fails)
//! turns the whole call into an `Err`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

use crate::error::{PersistError, Result, ShelfError, StorageError};
use crate::index::canonical_key;
use crate::keys::{CollectionMetadata, METADATA_COLLECTION};
use crate::store::{CollectionHandle, Store};
use crate::types::{CollectionOutcome, Document, PersistResult, RestoreResult};

use super::backend::{ColumnSpec, Row, StorageBackend, TableInfo};
use super::options::{CollectionOptionsFn, PersistOptions};

pub struct PersistenceCoordinator {
    store: Arc<Store>,
    backend: Arc<dyn StorageBackend>,
    /// Per-collection locks serializing storage operations.
    locks: Mutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl PersistenceCoordinator {
    pub fn new(store: Arc<Store>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            store,
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    // -----------------------------------------------------------------------
    // Persist
    // -----------------------------------------------------------------------

    /// Persist every dirty collection using the store's configured options.
    pub async fn persist(&self) -> Result<PersistResult> {
        let defaults = self.store.config().persist.clone();
        self.persist_with(&defaults, None).await
    }

    /// Persist every dirty collection. `per_collection` may override the
    /// defaults for individual collections.
    pub async fn persist_with(
        &self,
        defaults: &PersistOptions,
        per_collection: Option<&CollectionOptionsFn>,
    ) -> Result<PersistResult> {
        self.check_reachable().await?;

        let tasks = self.store.user_collections().into_iter().map(|(name, handle)| {
            let options = resolve_options(&name, defaults, per_collection);
            async move { self.persist_collection(&name, &handle, &options, true).await }
        });
        let mut outcomes = join_all(tasks).await;

        let meta_options = metadata_options(defaults);
        outcomes.push(
            self.persist_collection(METADATA_COLLECTION, self.store.metadata(), &meta_options, false)
                .await,
        );

        Ok(PersistResult { outcomes })
    }

    async fn persist_collection(
        &self,
        name: &str,
        handle: &CollectionHandle,
        options: &PersistOptions,
        record_keys: bool,
    ) -> CollectionOutcome {
        let _guard = match self.try_acquire(name) {
            Ok(guard) => guard,
            Err(e) => return self.fail(name, options, e),
        };

        let (docs, version, model) = {
            let collection = handle.lock();
            if !collection.is_dirty() {
                return CollectionOutcome::skipped(name);
            }
            let (docs, version) = collection.snapshot_documents();
            (docs, version, collection.model().clone())
        };

        let rows: Vec<Row> = docs
            .into_iter()
            .map(|doc| {
                let key = canonical_key(&model.primary_key_of(&doc));
                Row::new(key, Value::Object(options.save(doc)))
            })
            .collect();

        let chunk_count = match self.write_table(name, &rows, options).await {
            Ok(n) => n,
            Err(e) => return self.fail(name, options, e.into()),
        };

        let cleaned = handle.lock().mark_clean(version);
        if !cleaned {
            tracing::debug!(collection = %name, "collection changed during persist; left dirty");
        }
        if record_keys {
            self.record_key_snapshot(name);
        }

        tracing::debug!(collection = %name, rows = rows.len(), chunks = chunk_count, "persisted collection");
        CollectionOutcome {
            collection: name.to_string(),
            rows: rows.len(),
            chunk_count,
            skipped: false,
            error: None,
        }
    }

    /// Replace the stored table with `rows`. Returns the number of chunks written.
    async fn write_table(
        &self,
        name: &str,
        rows: &[Row],
        options: &PersistOptions,
    ) -> Result<usize, StorageError> {
        let columns = column_spec(options);
        self.backend.drop_table(name).await?;
        if rows.is_empty() {
            self.backend.create_table_if_missing(name, &columns).await?;
            return Ok(0);
        }
        self.write_chunks(name, rows, options).await
    }

    async fn write_chunks(
        &self,
        name: &str,
        rows: &[Row],
        options: &PersistOptions,
    ) -> Result<usize, StorageError> {
        let columns = column_spec(options);
        let mut written = 0;
        for (i, chunk) in rows.chunks(options.chunk_size()).enumerate() {
            self.backend.create_table_if_missing(name, &columns).await?;
            self.backend.insert_rows(name, &columns, chunk).await?;
            tracing::debug!(collection = %name, chunk = i, rows = chunk.len(), "wrote chunk");
            written += 1;
        }
        Ok(written)
    }

    /// Copy the collection's key counters into the metadata collection.
    fn record_key_snapshot(&self, name: &str) {
        let snapshot = self.store.keys().snapshot(name);
        if snapshot.entries.is_empty() {
            return;
        }
        let doc = snapshot.to_document();
        let key = Value::String(name.to_string());

        let mut metadata = self.store.metadata().lock();
        let outcome = match metadata.lookup(&key) {
            Some(existing) if existing == doc => return,
            Some(_) => metadata.update(doc).map(|_| ()),
            None => metadata.insert(doc).map(|_| ()),
        };
        if let Err(e) = outcome {
            tracing::warn!(collection = %name, error = %e, "failed to record key metadata");
        }
    }

    // -----------------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------------

    /// Restore every stored collection using the store's configured options.
    pub async fn restore(&self) -> Result<RestoreResult> {
        let defaults = self.store.config().persist.clone();
        self.restore_with(&defaults, None).await
    }

    /// Reload every registered collection found in storage. Restored
    /// collections are clean; key counters are raised to cover both the
    /// stored maxima and the keys present in the restored documents.
    pub async fn restore_with(
        &self,
        defaults: &PersistOptions,
        per_collection: Option<&CollectionOptionsFn>,
    ) -> Result<RestoreResult> {
        self.check_reachable().await?;
        let tables = self.backend.list_tables().await.map_err(|e| {
            tracing::warn!(error = %e, "could not list tables");
            ShelfError::from(e)
        })?;

        let mut result = RestoreResult::default();
        let mut stored_keys: BTreeMap<String, CollectionMetadata> = BTreeMap::new();

        if let Some(table) = tables.iter().find(|t| t.name == METADATA_COLLECTION) {
            let meta_options = metadata_options(defaults);
            let outcome = self
                .restore_collection(table, self.store.metadata(), &meta_options)
                .await;
            if outcome.is_ok() {
                stored_keys = self.read_key_metadata();
            }
            result.outcomes.push(outcome);
        }

        let mut targets = Vec::new();
        for table in &tables {
            if table.name == METADATA_COLLECTION {
                continue;
            }
            match self.store.collection(&table.name) {
                Some(handle) => targets.push((table, handle)),
                None => {
                    tracing::warn!(table = %table.name, "skipping stored table with no registered collection");
                    result.skipped.push(table.name.clone());
                }
            }
        }

        let tasks = targets.iter().map(|(table, handle)| {
            let options = resolve_options(&table.name, defaults, per_collection);
            async move { self.restore_collection(table, handle, &options).await }
        });
        result.outcomes.extend(join_all(tasks).await);

        for (name, handle) in self.store.user_collections() {
            self.reconcile_keys(&name, &handle, stored_keys.get(&name));
        }

        Ok(result)
    }

    /// Reload one collection from `table`, reading with the columns the
    /// table was created with rather than the call's column names.
    async fn restore_collection(
        &self,
        table: &TableInfo,
        handle: &CollectionHandle,
        options: &PersistOptions,
    ) -> CollectionOutcome {
        let name = table.name.as_str();
        let _guard = match self.try_acquire(name) {
            Ok(guard) => guard,
            Err(e) => return self.fail(name, options, e),
        };

        let docs = match self.read_table(name, &table.schema, options).await {
            Ok(docs) => docs,
            Err(e) => return self.fail(name, options, e.into()),
        };
        let rows = docs.len();
        handle.lock().load_trusted(docs);

        tracing::debug!(collection = %name, rows, "restored collection");
        CollectionOutcome {
            collection: name.to_string(),
            rows,
            chunk_count: 1,
            skipped: false,
            error: None,
        }
    }

    /// All rows of `name` as documents, load transform applied.
    async fn read_table(
        &self,
        name: &str,
        columns: &ColumnSpec,
        options: &PersistOptions,
    ) -> Result<Vec<Document>, StorageError> {
        let rows = self.backend.query(name, columns).await?;
        rows.into_iter()
            .map(|row| match row.data {
                Value::Object(doc) => Ok(options.load(doc)),
                _ => Err(StorageError::Corruption {
                    table: name.to_string(),
                    key: row.key,
                    source: None,
                }),
            })
            .collect()
    }

    fn read_key_metadata(&self) -> BTreeMap<String, CollectionMetadata> {
        let metadata = self.store.metadata().lock();
        metadata
            .documents()
            .iter()
            .filter_map(|doc| match CollectionMetadata::from_document(doc) {
                Ok(meta) => Some((meta.collection_name.clone(), meta)),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unreadable key metadata entry");
                    None
                }
            })
            .collect()
    }

    fn reconcile_keys(
        &self,
        name: &str,
        handle: &CollectionHandle,
        stored: Option<&CollectionMetadata>,
    ) {
        let collection = handle.lock();
        for field in collection.auto_integer_fields() {
            let stored_max = stored.and_then(|m| m.largest(&field));
            let observed = collection.max_integer(&field);
            self.store.keys().reconcile(name, &field, stored_max, observed);
        }
    }

    // -----------------------------------------------------------------------
    // Single-collection operations
    // -----------------------------------------------------------------------

    /// Read the stored documents of one collection without touching memory.
    pub async fn get_collection_records(
        &self,
        name: &str,
        options: &PersistOptions,
    ) -> Result<Vec<Document>> {
        let _guard = self.try_acquire(name)?;
        Ok(self.read_table(name, &column_spec(options), options).await?)
    }

    /// Write `docs` to the stored table of a registered collection, in
    /// chunks, replacing stored rows with the same primary key. The
    /// in-memory collection is not modified. Returns the chunks written.
    pub async fn add_collection_records(
        &self,
        name: &str,
        docs: Vec<Document>,
        options: &PersistOptions,
    ) -> Result<usize> {
        let handle = self
            .store
            .collection(name)
            .ok_or_else(|| PersistError::NotRegistered(name.to_string()))?;
        let _guard = self.try_acquire(name)?;

        let model = handle.lock().model().clone();
        let rows: Vec<Row> = docs
            .into_iter()
            .map(|doc| {
                let key = canonical_key(&model.primary_key_of(&doc));
                Row::new(key, Value::Object(options.save(doc)))
            })
            .collect();
        Ok(self.write_chunks(name, &rows, options).await?)
    }

    /// Drop the stored tables of `names`. Registered collections among them
    /// are marked dirty so the next persist writes them again.
    pub async fn clear_collections(&self, names: &[&str]) -> Result<()> {
        for name in names {
            let _guard = self.try_acquire(name)?;
            self.backend.drop_table(name).await?;
            if let Some(handle) = self.store.collection(name) {
                handle.lock().mark_dirty();
            }
            tracing::debug!(collection = %name, "dropped stored table");
        }
        Ok(())
    }

    /// Drop every stored table and mark every registered collection dirty.
    pub async fn clear_persistent_db(&self) -> Result<()> {
        self.check_reachable().await?;
        let tables = self.backend.list_tables().await?;
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        self.clear_collections(&names).await?;
        for name in self.store.collection_names() {
            if let Some(handle) = self.store.collection(&name) {
                handle.lock().mark_dirty();
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn check_reachable(&self) -> Result<()> {
        self.backend.ping().await.map_err(|e| {
            tracing::warn!(error = %e, "storage backend unreachable");
            ShelfError::from(e)
        })
    }

    fn try_acquire(&self, collection: &str) -> Result<OwnedMutexGuard<()>, PersistError> {
        let lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(collection.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(())))
                .clone()
        };
        lock.try_lock_owned()
            .map_err(|_| PersistError::ConcurrentOperation(collection.to_string()))
    }

    fn fail(&self, name: &str, options: &PersistOptions, error: PersistError) -> CollectionOutcome {
        tracing::warn!(collection = %name, error = %error, "storage operation failed");
        options.report(name, &error);
        CollectionOutcome::failed(name, error)
    }
}

impl std::fmt::Debug for PersistenceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceCoordinator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn resolve_options(
    name: &str,
    defaults: &PersistOptions,
    per_collection: Option<&CollectionOptionsFn>,
) -> PersistOptions {
    match per_collection {
        Some(f) => f(name, defaults),
        None => defaults.clone(),
    }
}

/// The metadata collection is stored without item transforms.
fn metadata_options(defaults: &PersistOptions) -> PersistOptions {
    PersistOptions {
        on_storage_error: defaults.on_storage_error.clone(),
        ..PersistOptions::from(defaults.settings())
    }
}

fn column_spec(options: &PersistOptions) -> ColumnSpec {
    ColumnSpec::new(
        options.key_column_name.as_str(),
        options.data_column_name.as_str(),
    )
}
