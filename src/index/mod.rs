//! In-memory indices maintained by `IndexedCollection`.
//!
//! - [`BinaryIndex`] keeps document positions sorted by one field so equality
//!   lookups and insertion points are found by binary search.
//! - [`UniqueIndex`] maps a field value (or compound key) to the position of
//!   the only document holding it.
//!
//! Both store positions into the collection's document sequence; removing a
//! document shifts later positions down by one and the indices are told so.

pub mod binary;
pub mod unique;

pub use binary::BinaryIndex;
pub use unique::{canonical_key, UniqueIndex};
