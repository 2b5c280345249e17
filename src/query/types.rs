//! Query type definitions: the filter tree, sort and pagination options.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Filter tree
// ============================================================================

/// A condition applied to the value found at one field path.
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Regex(Regex),
    /// `true`: the path must be present (null counts as present).
    Exists(bool),
}

/// Structural predicate over a document.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Matches every document (the empty query).
    All,
    Field { path: String, condition: Condition },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn field(path: impl Into<String>, condition: Condition) -> Self {
        Filter::Field {
            path: path.into(),
            condition,
        }
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path, Condition::Eq(value.into()))
    }

    pub fn ne(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path, Condition::Ne(value.into()))
    }

    pub fn lt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path, Condition::Lt(value.into()))
    }

    pub fn lte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path, Condition::Lte(value.into()))
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path, Condition::Gt(value.into()))
    }

    pub fn gte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path, Condition::Gte(value.into()))
    }

    pub fn is_in(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self::field(path, Condition::In(values))
    }

    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut a), Filter::And(b)) => {
                a.extend(b);
                Filter::And(a)
            }
            (Filter::And(mut a), f) => {
                a.push(f);
                Filter::And(a)
            }
            (f, g) => Filter::And(vec![f, g]),
        }
    }

    /// Every field path referenced by this filter, in order of appearance.
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::All => {}
            Filter::Field { path, .. } => out.push(path),
            Filter::And(fs) | Filter::Or(fs) => fs.iter().for_each(|f| f.collect_paths(out)),
            Filter::Not(f) => f.collect_paths(out),
        }
    }
}

// ============================================================================
// Sort / pagination
// ============================================================================

/// Sort direction for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A sort specification for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub field: String,
    pub direction: SortDirection,
}

impl SortEntry {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Sort and pagination applied after filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub sort: Vec<SortEntry>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

// ============================================================================
// Tests
// ============================================================================
