use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PersistError;

/// One record in a collection: field name → value.
pub type Document = Map<String, Value>;

// ============================================================================
// Change records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// One logical mutation of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub before: Option<Document>,
    pub after: Option<Document>,
}

impl ChangeRecord {
    pub fn added(after: Document) -> Self {
        Self {
            kind: ChangeKind::Added,
            before: None,
            after: Some(after),
        }
    }

    pub fn updated(before: Document, after: Document) -> Self {
        Self {
            kind: ChangeKind::Updated,
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn removed(before: Document) -> Self {
        Self {
            kind: ChangeKind::Removed,
            before: Some(before),
            after: None,
        }
    }
}

/// What a ChangeTracker buffers and hands to listeners.
///
/// Single-document operations produce `Single`; batch operations produce one
/// `Compound` holding a record per affected document.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Single(ChangeRecord),
    Compound(Vec<ChangeRecord>),
}

impl Change {
    pub fn records(&self) -> &[ChangeRecord] {
        match self {
            Self::Single(r) => std::slice::from_ref(r),
            Self::Compound(rs) => rs,
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

// ============================================================================
// Persist / restore results
// ============================================================================

/// Outcome of persisting or restoring a single collection.
#[derive(Debug)]
pub struct CollectionOutcome {
    pub collection: String,
    /// Rows written (persist) or read (restore).
    pub rows: usize,
    /// Insert batches issued (persist) or backend reads issued (restore).
    pub chunk_count: usize,
    /// Clean collections are skipped by `persist` without touching storage.
    pub skipped: bool,
    pub error: Option<PersistError>,
}

impl CollectionOutcome {
    pub(crate) fn skipped(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            rows: 0,
            chunk_count: 0,
            skipped: true,
            error: None,
        }
    }

    pub(crate) fn failed(collection: impl Into<String>, error: PersistError) -> Self {
        Self {
            collection: collection.into(),
            rows: 0,
            chunk_count: 0,
            skipped: false,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of `persist`: one outcome per known collection.
#[derive(Debug, Default)]
pub struct PersistResult {
    pub outcomes: Vec<CollectionOutcome>,
}

/// Aggregate result of `restore`.
#[derive(Debug, Default)]
pub struct RestoreResult {
    pub outcomes: Vec<CollectionOutcome>,
    /// Tables found in storage with no registered collection.
    pub skipped: Vec<String>,
}

macro_rules! impl_aggregate {
    ($ty:ty) => {
        impl $ty {
            pub fn outcome(&self, collection: &str) -> Option<&CollectionOutcome> {
                self.outcomes.iter().find(|o| o.collection == collection)
            }

            pub fn is_success(&self) -> bool {
                self.outcomes.iter().all(CollectionOutcome::is_ok)
            }

            pub fn failures(&self) -> impl Iterator<Item = &CollectionOutcome> {
                self.outcomes.iter().filter(|o| !o.is_ok())
            }

            pub fn total_rows(&self) -> usize {
                self.outcomes.iter().map(|o| o.rows).sum()
            }
        }
    };
}

impl_aggregate!(PersistResult);
impl_aggregate!(RestoreResult);

// ============================================================================
// Tests
// ============================================================================
