//! Compiled queries: a filter tree plus the index hint derived from it once.

use serde_json::Value;

use crate::error::QueryError;
use crate::model::CollectionModel;
use crate::types::Document;

use super::operators::{is_composite, matches_filter};
use super::parse::parse_filter;
use super::types::{Condition, Filter};

/// A single-field equality that a binary index on `path` can answer.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHint {
    pub path: String,
    pub value: Value,
}

/// Reusable evaluator for one query.
///
/// Evaluation re-runs the predicate each time, so the same compiled query
/// can be iterated any number of times against a changing collection.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    filter: Filter,
    hint: Option<IndexHint>,
}

impl CompiledQuery {
    pub fn new(filter: Filter) -> Self {
        let hint = match &filter {
            Filter::Field {
                path,
                condition: Condition::Eq(value),
            } if !value.is_null() && !is_composite(value) => Some(IndexHint {
                path: path.clone(),
                value: value.clone(),
            }),
            _ => None,
        };
        Self { filter, hint }
    }

    /// Parse and compile a JSON filter, validating fields against `model`.
    pub fn from_json(filter: &Value, model: Option<&CollectionModel>) -> Result<Self, QueryError> {
        Ok(Self::new(parse_filter(filter, model)?))
    }

    /// The query matching every document.
    pub fn all() -> Self {
        Self::new(Filter::All)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        matches_filter(doc, &self.filter)
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn index_hint(&self) -> Option<&IndexHint> {
        self.hint.as_ref()
    }
}

impl From<Filter> for CompiledQuery {
    fn from(filter: Filter) -> Self {
        Self::new(filter)
    }
}

// ============================================================================
// Tests
// ============================================================================
