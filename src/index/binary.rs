use std::cmp::Ordering;

use serde_json::Value;

use crate::query::operators::{compare_values, get_field_value, is_composite};
use crate::types::Document;

/// Sorted positional index over one field.
///
/// `positions` holds indexes into the owning collection's document vector,
/// ordered by [`compare_values`] on the indexed field. Documents whose field
/// is missing sort as null (last). Ties keep insertion order.
#[derive(Debug, Clone)]
pub struct BinaryIndex {
    field: String,
    positions: Vec<usize>,
    /// Entries whose value is an array or object. While non-zero, equality
    /// lookups are not answered from the index (array values match by element).
    composite: usize,
}

fn value_at<'a>(docs: &'a [Document], field: &str, pos: usize) -> &'a Value {
    docs.get(pos)
        .and_then(|d| get_field_value(d, field))
        .unwrap_or(&Value::Null)
}

impl BinaryIndex {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            positions: Vec::new(),
            composite: 0,
        }
    }

    /// Build an index over all of `docs`.
    pub fn build(field: impl Into<String>, docs: &[Document]) -> Self {
        let mut index = Self::new(field);
        index.rebuild(docs);
        index
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions in index order.
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// True when equality lookups can be answered from this index.
    pub fn supports_lookup(&self) -> bool {
        self.composite == 0
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.composite = 0;
    }

    pub fn rebuild(&mut self, docs: &[Document]) {
        let field = self.field.clone();
        self.positions = (0..docs.len()).collect();
        self.positions
            .sort_by(|&a, &b| compare_values(value_at(docs, &field, a), value_at(docs, &field, b)));
        self.composite = self
            .positions
            .iter()
            .filter(|&&p| is_composite(value_at(docs, &field, p)))
            .count();
    }

    /// Insertion point for `value`: after every entry comparing less or equal.
    fn upper_bound(&self, docs: &[Document], value: &Value) -> usize {
        self.positions.partition_point(|&p| {
            compare_values(value_at(docs, &self.field, p), value) != Ordering::Greater
        })
    }

    fn lower_bound(&self, docs: &[Document], value: &Value) -> usize {
        self.positions
            .partition_point(|&p| compare_values(value_at(docs, &self.field, p), value) == Ordering::Less)
    }

    /// Add the document already stored at `docs[pos]`.
    pub fn insert(&mut self, docs: &[Document], pos: usize) {
        let value = value_at(docs, &self.field, pos);
        if is_composite(value) {
            self.composite += 1;
        }
        let at = self.upper_bound(docs, value);
        self.positions.insert(at, pos);
    }

    /// Remove the entry for `docs[pos]`; must be called while `docs[pos]`
    /// still holds the indexed value.
    pub fn remove(&mut self, docs: &[Document], pos: usize) {
        let value = value_at(docs, &self.field, pos);
        let lo = self.lower_bound(docs, value);
        let hi = self.upper_bound(docs, value);
        let found = self.positions[lo..hi]
            .iter()
            .position(|&p| p == pos)
            .map(|i| lo + i)
            .or_else(|| self.positions.iter().position(|&p| p == pos));
        if let Some(i) = found {
            self.positions.remove(i);
            if is_composite(value) {
                self.composite = self.composite.saturating_sub(1);
            }
        }
    }

    /// Account for the document at `removed` leaving the sequence.
    pub fn shift_down(&mut self, removed: usize) {
        for p in self.positions.iter_mut() {
            if *p > removed {
                *p -= 1;
            }
        }
    }

    /// Positions whose field compares equal to `value`, in index order.
    pub fn lookup(&self, docs: &[Document], value: &Value) -> &[usize] {
        let lo = self.lower_bound(docs, value);
        let hi = self.upper_bound(docs, value);
        &self.positions[lo..hi.max(lo)]
    }

    /// True if the index order agrees with the comparator.
    pub fn is_consistent(&self, docs: &[Document]) -> bool {
        self.positions.len() == docs.len()
            && self.positions.windows(2).all(|w| {
                compare_values(value_at(docs, &self.field, w[0]), value_at(docs, &self.field, w[1]))
                    != Ordering::Greater
            })
    }
}

// ============================================================================
// Tests
// ============================================================================
