//! IndexedCollection — one named set of documents with its indices,
//! uniqueness constraints and change tracker.
//!
//! Documents live in an insertion-ordered `Vec`. Every index stores
//! positions into that vector, so any operation that removes a document
//! must first unhook it from every index (while the document is still in
//! place) and then shift the remaining positions down.
//!
//! Every mutation either applies completely or returns an error with the
//! collection untouched. Listeners are called while the owner holds the
//! collection's lock; a listener must not lock the same collection again.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::error::{CollectionError, QueryError, Result, ShelfError};
use crate::index::{canonical_key, BinaryIndex, UniqueIndex};
use crate::keys::KeyMetadataStore;
use crate::model::{validate_document, CollectionModel, FieldType};
use crate::query::{apply_options, get_field_value, CompiledQuery, QueryOptions};
use crate::types::{Change, ChangeRecord, Document};

use super::changes::{ChangeTracker, ListenerId};

/// Per-item result of [`IndexedCollection::insert_many`].
pub type InsertOutcome = Result<Document>;

pub struct IndexedCollection {
    name: String,
    model: CollectionModel,
    docs: Vec<Document>,
    /// field → sorted positional index
    indices: BTreeMap<String, BinaryIndex>,
    /// `unique[0]` is always the primary-key constraint.
    unique: Vec<UniqueIndex>,
    dirty: bool,
    /// Bumped on every mutation; lets persistence detect writes that raced it.
    version: u64,
    tracker: ChangeTracker,
    keys: Weak<KeyMetadataStore>,
}

impl IndexedCollection {
    /// Create an empty collection for `model`. Auto-generated fields are
    /// registered with `keys`, which the collection references but does not own.
    pub fn new(model: CollectionModel, keys: &Arc<KeyMetadataStore>, change_capacity: usize) -> Self {
        keys.register(&model.name, &model.auto_generated_fields());

        let indices = model
            .indexed_fields()
            .into_iter()
            .map(|f| (f.to_string(), BinaryIndex::new(f)))
            .collect();

        let mut unique = vec![UniqueIndex::new(
            model
                .primary_key_fields()
                .into_iter()
                .map(String::from)
                .collect(),
        )];
        unique.extend(model.unique_fields().into_iter().map(UniqueIndex::single));

        Self {
            name: model.name.clone(),
            tracker: ChangeTracker::new(model.name.clone(), change_capacity),
            model,
            docs: Vec::new(),
            indices,
            unique,
            dirty: false,
            version: 0,
            keys: Arc::downgrade(keys),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &CollectionModel {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Fields carrying a binary index.
    pub fn indexed_fields(&self) -> Vec<&str> {
        self.indices.keys().map(String::as_str).collect()
    }

    /// Display names of the uniqueness constraints, primary key first.
    pub fn unique_constraints(&self) -> Vec<String> {
        self.unique.iter().map(UniqueIndex::name).collect()
    }

    /// Compile a JSON filter, checking its fields against this collection's model.
    pub fn compile(&self, filter: &Value) -> Result<CompiledQuery, QueryError> {
        CompiledQuery::from_json(filter, Some(&self.model))
    }

    // -----------------------------------------------------------------------
    // Change tracking
    // -----------------------------------------------------------------------

    pub fn on_change(&self, callback: impl Fn(&Change) + Send + Sync + 'static) -> ListenerId {
        self.tracker.on(callback)
    }

    pub fn off_change(&self, id: ListenerId) {
        self.tracker.off(id);
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub(crate) fn teardown(&self) {
        self.tracker.teardown();
    }

    // -----------------------------------------------------------------------
    // Dirty state
    // -----------------------------------------------------------------------

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Clear the dirty flag if nothing has changed since `version` was read.
    /// Returns whether the flag was cleared.
    pub fn mark_clean(&mut self, version: u64) -> bool {
        if self.version != version {
            return false;
        }
        self.dirty = false;
        true
    }

    /// Flag the collection as needing a persist without changing it.
    pub fn mark_dirty(&mut self) {
        self.touch();
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.version += 1;
    }

    /// Current documents plus the version they correspond to.
    pub fn snapshot_documents(&self) -> (Vec<Document>, u64) {
        (self.docs.clone(), self.version)
    }

    /// Replace the contents with documents read from storage. Uniqueness is
    /// not re-checked (for duplicates the later document wins the constraint
    /// slot) and the collection is left clean. No change is emitted.
    pub fn load_trusted(&mut self, docs: Vec<Document>) {
        self.docs = docs;
        self.rebuild_indices();
        self.version += 1;
        self.dirty = false;
    }

    /// Largest integer value of `field` across the documents.
    pub fn max_integer(&self, field: &str) -> Option<i64> {
        self.docs
            .iter()
            .filter_map(|d| d.get(field).and_then(Value::as_i64))
            .max()
    }

    fn rebuild_indices(&mut self) {
        for index in self.indices.values_mut() {
            index.rebuild(&self.docs);
        }
        for constraint in self.unique.iter_mut() {
            constraint.rebuild(&self.docs);
        }
    }

    // -----------------------------------------------------------------------
    // Insert
    // -----------------------------------------------------------------------

    /// Insert `doc`, filling missing auto-generated fields. Returns the
    /// stored document.
    pub fn insert(&mut self, doc: Document) -> Result<Document> {
        let stored = self.insert_one(doc)?;
        self.tracker
            .add_change(Change::Single(ChangeRecord::added(stored.clone())));
        Ok(stored)
    }

    /// Insert each document independently. A failed item does not undo the
    /// items before it. Successful inserts are reported as one compound change.
    pub fn insert_many(&mut self, docs: impl IntoIterator<Item = Document>) -> Vec<InsertOutcome> {
        let outcomes: Vec<InsertOutcome> = docs.into_iter().map(|d| self.insert_one(d)).collect();
        let records: Vec<ChangeRecord> = outcomes
            .iter()
            .filter_map(|o| o.as_ref().ok())
            .map(|d| ChangeRecord::added(d.clone()))
            .collect();
        if !records.is_empty() {
            self.tracker.add_change(Change::Compound(records));
        }
        outcomes
    }

    fn insert_one(&mut self, mut doc: Document) -> Result<Document> {
        validate_document(&self.model, &doc)?;
        self.assign_keys(&mut doc)?;
        self.check_unique(&doc, None)?;

        self.docs.push(doc);
        let pos = self.docs.len() - 1;
        for index in self.indices.values_mut() {
            index.insert(&self.docs, pos);
        }
        for constraint in self.unique.iter_mut() {
            constraint.insert(&self.docs[pos], pos);
        }
        self.touch();
        Ok(self.docs[pos].clone())
    }

    fn assign_keys(&self, doc: &mut Document) -> Result<()> {
        let auto = self.model.auto_generated_fields();
        if auto.is_empty() {
            return Ok(());
        }
        let keys = self
            .keys
            .upgrade()
            .ok_or_else(|| CollectionError::StoreClosed(self.name.clone()))?;
        for field in auto {
            match doc.get(field).filter(|v| !v.is_null()) {
                Some(explicit) => {
                    if let Some(n) = explicit.as_i64() {
                        keys.observe(&self.name, field, n);
                    }
                }
                None => {
                    let key = keys.next_key(&self.name, field);
                    doc.insert(field.to_string(), Value::from(key));
                }
            }
        }
        Ok(())
    }

    fn check_unique(&self, doc: &Document, exclude: Option<usize>) -> Result<(), CollectionError> {
        for constraint in &self.unique {
            if let Some(value) = constraint.conflict(doc, exclude) {
                return Err(CollectionError::DuplicateKey {
                    collection: self.name.clone(),
                    field: constraint.name(),
                    value,
                });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Replace the stored document sharing `doc`'s primary key.
    pub fn update(&mut self, doc: Document) -> Result<Document> {
        let pos = self.position_of(&doc)?;
        let before = self.replace_at(pos, doc)?;
        let after = self.docs[pos].clone();
        self.observe_keys(&after);
        self.touch();
        self.tracker
            .add_change(Change::Single(ChangeRecord::updated(before, after.clone())));
        Ok(after)
    }

    /// Apply `f` to every matching document. Either every update applies or,
    /// on the first failure, the ones already applied are reverted and the
    /// error is returned. Returns the number of documents updated.
    pub fn update_where(
        &mut self,
        query: &CompiledQuery,
        mut f: impl FnMut(&mut Document),
    ) -> Result<usize> {
        let positions = self.matching_positions(query);
        let mut applied: Vec<(usize, Document)> = Vec::with_capacity(positions.len());

        for &pos in &positions {
            let mut next = self.docs[pos].clone();
            f(&mut next);
            match self.replace_at(pos, next) {
                Ok(before) => applied.push((pos, before)),
                Err(e) => {
                    for (pos, before) in applied.into_iter().rev() {
                        self.reindex_at(pos, before);
                    }
                    return Err(e);
                }
            }
        }

        if !applied.is_empty() {
            let records = applied
                .into_iter()
                .map(|(pos, before)| ChangeRecord::updated(before, self.docs[pos].clone()))
                .collect::<Vec<_>>();
            for record in &records {
                if let Some(after) = &record.after {
                    self.observe_keys(after);
                }
            }
            self.touch();
            self.tracker.add_change(Change::Compound(records));
        }
        Ok(positions.len())
    }

    /// Validate and store `next` at `pos`, returning the previous document.
    /// Neither the dirty flag nor the key counters are touched; callers do
    /// that once every replacement has succeeded.
    fn replace_at(&mut self, pos: usize, next: Document) -> Result<Document> {
        validate_document(&self.model, &next)?;

        let current = &self.docs[pos];
        for field in self.model.read_only_fields() {
            if current.get(field) != next.get(field) {
                return Err(CollectionError::ReadOnlyField {
                    collection: self.name.clone(),
                    field: field.to_string(),
                }
                .into());
            }
        }
        self.check_unique(&next, Some(pos))?;
        Ok(self.reindex_at(pos, next))
    }

    /// Raise the key counters to any explicit auto-generated values in `doc`.
    fn observe_keys(&self, doc: &Document) {
        if let Some(keys) = self.keys.upgrade() {
            for field in self.model.auto_generated_fields() {
                if let Some(n) = doc.get(field).and_then(Value::as_i64) {
                    keys.observe(&self.name, field, n);
                }
            }
        }
    }

    /// Swap the document at `pos`, re-sorting only the indices whose field changed.
    fn reindex_at(&mut self, pos: usize, next: Document) -> Document {
        let changed: Vec<String> = self
            .indices
            .keys()
            .filter(|f| get_field_value(&self.docs[pos], f) != get_field_value(&next, f))
            .cloned()
            .collect();

        for field in &changed {
            if let Some(index) = self.indices.get_mut(field) {
                index.remove(&self.docs, pos);
            }
        }
        for constraint in self.unique.iter_mut() {
            constraint.remove(&self.docs[pos], pos);
        }

        let before = std::mem::replace(&mut self.docs[pos], next);

        for field in &changed {
            if let Some(index) = self.indices.get_mut(field) {
                index.insert(&self.docs, pos);
            }
        }
        for constraint in self.unique.iter_mut() {
            constraint.insert(&self.docs[pos], pos);
        }
        before
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    /// Remove the stored document sharing `doc`'s primary key. Fails with
    /// `NotFound` if there is none.
    pub fn remove(&mut self, doc: &Document) -> Result<Document> {
        let pos = self.position_of(doc)?;
        let removed = self.remove_at(pos);
        self.touch();
        self.tracker
            .add_change(Change::Single(ChangeRecord::removed(removed.clone())));
        Ok(removed)
    }

    /// Like [`remove`](Self::remove) but a missing document is not an error.
    pub fn remove_if_present(&mut self, doc: &Document) -> Option<Document> {
        match self.remove(doc) {
            Ok(removed) => Some(removed),
            Err(_) => None,
        }
    }

    /// Remove every matching document. Zero matches is not an error.
    pub fn remove_where(&mut self, query: &CompiledQuery) -> Vec<Document> {
        let mut positions = self.matching_positions(query);
        if positions.is_empty() {
            return Vec::new();
        }
        positions.sort_unstable_by(|a, b| b.cmp(a));
        let mut removed: Vec<Document> = positions.into_iter().map(|p| self.remove_at(p)).collect();
        removed.reverse();

        self.touch();
        self.tracker.add_change(Change::Compound(
            removed.iter().cloned().map(ChangeRecord::removed).collect(),
        ));
        removed
    }

    fn remove_at(&mut self, pos: usize) -> Document {
        for index in self.indices.values_mut() {
            index.remove(&self.docs, pos);
        }
        for constraint in self.unique.iter_mut() {
            constraint.remove(&self.docs[pos], pos);
        }
        let removed = self.docs.remove(pos);
        for index in self.indices.values_mut() {
            index.shift_down(pos);
        }
        for constraint in self.unique.iter_mut() {
            constraint.shift_down(pos);
        }
        removed
    }

    /// Remove every document; index and constraint configuration is kept.
    pub fn clear_collection(&mut self) {
        let removed = std::mem::take(&mut self.docs);
        for index in self.indices.values_mut() {
            index.clear();
        }
        for constraint in self.unique.iter_mut() {
            constraint.clear();
        }
        self.touch();
        if !removed.is_empty() {
            self.tracker.add_change(Change::Compound(
                removed.into_iter().map(ChangeRecord::removed).collect(),
            ));
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Positions of the documents matching `query`, in collection order.
    fn matching_positions(&self, query: &CompiledQuery) -> Vec<usize> {
        if let Some(hint) = query.index_hint() {
            if let Some(index) = self.indices.get(&hint.path).filter(|i| i.supports_lookup()) {
                let mut hits: Vec<usize> = index
                    .lookup(&self.docs, &hint.value)
                    .iter()
                    .copied()
                    .filter(|&p| query.matches(&self.docs[p]))
                    .collect();
                hits.sort_unstable();
                return hits;
            }
        }
        (0..self.docs.len())
            .filter(|&p| query.matches(&self.docs[p]))
            .collect()
    }

    fn position_of(&self, doc: &Document) -> Result<usize, CollectionError> {
        let key = self.model.primary_key_of(doc);
        self.position_of_key(&key)
            .ok_or_else(|| CollectionError::NotFound {
                collection: self.name.clone(),
                key: canonical_key(&key),
            })
    }

    fn position_of_key(&self, key: &Value) -> Option<usize> {
        if key.is_null() {
            return None;
        }
        self.unique.first().and_then(|pk| pk.get(key))
    }

    /// Lazy view over the documents matching `query`.
    pub fn find(&self, query: CompiledQuery) -> Find<'_> {
        Find {
            collection: self,
            query,
        }
    }

    pub fn data(&self, query: &CompiledQuery) -> Vec<Document> {
        self.matching_positions(query)
            .into_iter()
            .map(|p| self.docs[p].clone())
            .collect()
    }

    /// Matching documents sorted and paginated per `options`.
    pub fn data_with(&self, query: &CompiledQuery, options: &QueryOptions) -> Vec<Document> {
        apply_options(self.data(query), options)
    }

    pub fn count(&self, query: &CompiledQuery) -> usize {
        self.matching_positions(query).len()
    }

    pub fn first(&self, query: &CompiledQuery) -> Option<Document> {
        self.matching_positions(query)
            .first()
            .map(|&p| self.docs[p].clone())
    }

    /// The only document matching `query`.
    pub fn single(&self, query: &CompiledQuery) -> Result<Document> {
        let positions = self.matching_positions(query);
        match positions.as_slice() {
            [pos] => Ok(self.docs[*pos].clone()),
            [] => Err(CollectionError::NotFound {
                collection: self.name.clone(),
                key: format!("{:?}", query.filter()),
            }
            .into()),
            many => Err(CollectionError::AmbiguousResult {
                collection: self.name.clone(),
                matches: many.len(),
            }
            .into()),
        }
    }

    /// Document with primary key `key` (bare value, or array for a compound key).
    pub fn lookup(&self, key: &Value) -> Option<Document> {
        self.position_of_key(key).map(|p| self.docs[p].clone())
    }

    pub fn lookup_strict(&self, key: &Value) -> Result<Document> {
        self.lookup(key).ok_or_else(|| {
            ShelfError::from(CollectionError::NotFound {
                collection: self.name.clone(),
                key: canonical_key(key),
            })
        })
    }

    /// All documents in collection order.
    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    // -----------------------------------------------------------------------
    // Index management
    // -----------------------------------------------------------------------

    /// Build a binary index on `field` if there is none yet.
    pub fn ensure_index(&mut self, field: &str) -> Result<(), QueryError> {
        self.check_field(field)?;
        if !self.indices.contains_key(field) {
            self.indices
                .insert(field.to_string(), BinaryIndex::build(field, &self.docs));
        }
        Ok(())
    }

    /// Add a uniqueness constraint on `field`. Fails without changes if the
    /// current documents already violate it.
    pub fn ensure_unique(&mut self, field: &str) -> Result<()> {
        self.check_field(field)?;
        if self.unique.iter().any(|u| u.fields().len() == 1 && u.fields()[0] == field) {
            return Ok(());
        }

        let mut constraint = UniqueIndex::single(field);
        for (pos, doc) in self.docs.iter().enumerate() {
            if let Some(value) = constraint.conflict(doc, None) {
                return Err(CollectionError::DuplicateKey {
                    collection: self.name.clone(),
                    field: field.to_string(),
                    value,
                }
                .into());
            }
            constraint.insert(doc, pos);
        }
        self.unique.push(constraint);
        self.ensure_index(field)?;
        Ok(())
    }

    fn check_field(&self, field: &str) -> Result<(), QueryError> {
        if self.model.has_field(field) {
            Ok(())
        } else {
            Err(QueryError::UnknownField {
                collection: self.name.clone(),
                field: field.to_string(),
            })
        }
    }

    /// True if every binary index agrees with the comparator and covers
    /// every document.
    pub fn indices_consistent(&self) -> bool {
        self.indices.values().all(|i| i.is_consistent(&self.docs))
    }

    /// Auto-generated integer fields of the model.
    pub(crate) fn auto_integer_fields(&self) -> Vec<String> {
        self.model
            .fields
            .iter()
            .filter(|f| f.auto_generate && f.field_type == FieldType::Integer)
            .map(|f| f.name.clone())
            .collect()
    }
}

impl std::fmt::Debug for IndexedCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedCollection")
            .field("name", &self.name)
            .field("len", &self.docs.len())
            .field("indices", &self.indices.keys().collect::<Vec<_>>())
            .field("dirty", &self.dirty)
            .field("version", &self.version)
            .finish()
    }
}

// ============================================================================
// Find
// ============================================================================

/// Re-iterable result of [`IndexedCollection::find`]. Each call to
/// [`iter`](Find::iter) evaluates the query afresh.
pub struct Find<'a> {
    collection: &'a IndexedCollection,
    query: CompiledQuery,
}

impl<'a> Find<'a> {
    pub fn iter(&self) -> Box<dyn Iterator<Item = &'a Document> + '_> {
        let collection: &'a IndexedCollection = self.collection;
        let docs = &collection.docs;
        let query = &self.query;

        if let Some(hint) = query.index_hint() {
            if let Some(index) = collection.indices.get(&hint.path).filter(|i| i.supports_lookup()) {
                let mut hits = index.lookup(docs, &hint.value).to_vec();
                hits.sort_unstable();
                return Box::new(
                    hits.into_iter()
                        .map(move |p| &docs[p])
                        .filter(move |d| query.matches(d)),
                );
            }
        }
        Box::new(docs.iter().filter(move |d| query.matches(d)))
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn query(&self) -> &CompiledQuery {
        &self.query
    }
}

impl<'f, 'a> IntoIterator for &'f Find<'a> {
    type Item = &'a Document;
    type IntoIter = Box<dyn Iterator<Item = &'a Document> + 'f>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
