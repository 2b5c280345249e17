//! Indexed collections and their change tracking.
//!
//! - [`indexed`] — [`IndexedCollection`]: documents, indices, constraints,
//!   CRUD and queries.
//! - [`changes`] — [`ChangeTracker`]: bounded change log plus listeners.

pub mod changes;
pub mod indexed;

pub use changes::{ChangeTracker, ListenerId, DEFAULT_CHANGE_CAPACITY};
pub use indexed::{Find, IndexedCollection, InsertOutcome};
