//! Predicate queries over documents.
//!
//! A query arrives either as a Mongo-style JSON object (`{"age": {"$gt": 30}}`)
//! or is built directly as a [`Filter`] tree. [`parse_filter`] turns the JSON
//! form into the tree, validating operator names, operand shapes and (when a
//! model is supplied) field names. [`CompiledQuery`] wraps a tree with its
//! index hint and is evaluated against documents without re-parsing.

pub mod compile;
pub mod execute;
pub mod operators;
pub mod parse;
pub mod types;

pub use compile::{CompiledQuery, IndexHint};
pub use execute::{apply_options, paginate_records, sort_records};
pub use operators::{compare_values, get_field_value};
pub use parse::parse_filter;
pub use types::{Condition, Filter, QueryOptions, SortDirection, SortEntry};
