//! Sorting and pagination over materialized query results.

use std::cmp::Ordering;

use serde_json::Value;

use crate::types::Document;

use super::operators::{compare_values, get_field_value};
use super::types::{QueryOptions, SortDirection, SortEntry};

/// Sort documents by multiple fields with cascading priority. Stable, so
/// documents that compare equal keep their collection order.
pub fn sort_records(mut records: Vec<Document>, sort: &[SortEntry]) -> Vec<Document> {
    if sort.is_empty() {
        return records;
    }

    records.sort_by(|a, b| {
        for entry in sort {
            let va = get_field_value(a, &entry.field).unwrap_or(&Value::Null);
            let vb = get_field_value(b, &entry.field).unwrap_or(&Value::Null);
            let cmp = compare_values(va, vb);
            if cmp != Ordering::Equal {
                return if entry.direction == SortDirection::Desc {
                    cmp.reverse()
                } else {
                    cmp
                };
            }
        }
        Ordering::Equal
    });

    records
}

/// Apply offset then limit.
pub fn paginate_records(
    records: Vec<Document>,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Vec<Document> {
    let iter = records.into_iter().skip(offset.unwrap_or(0));
    match limit {
        Some(n) => iter.take(n).collect(),
        None => iter.collect(),
    }
}

/// Sort, then paginate.
pub fn apply_options(records: Vec<Document>, options: &QueryOptions) -> Vec<Document> {
    let sorted = sort_records(records, &options.sort);
    paginate_records(sorted, options.offset, options.limit)
}

// ============================================================================
// Tests
// ============================================================================
