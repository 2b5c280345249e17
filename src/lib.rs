//! Embedded, indexed, in-memory document store with chunked persistence to
//! pluggable storage backends.
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use shelfdb::model::{model, FieldDef};
//! use shelfdb::{Store, StoreConfig};
//!
//! let store = Arc::new(Store::new(StoreConfig::default()));
//! let people = store
//!     .add_collection(
//!         model("people")
//!             .field(FieldDef::integer("id").primary_key().auto_generate())
//!             .field(FieldDef::string("name").required())
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let doc = json!({"name": "Alfred"}).as_object().cloned().unwrap();
//! let stored = people.lock().insert(doc).unwrap();
//! assert_eq!(stored["id"], 1);
//! ```

pub mod error;
pub mod types;

pub mod collection;
pub mod index;
pub mod keys;
pub mod model;
pub mod persist;
pub mod query;
pub mod store;
pub mod sync;

pub use collection::{ChangeTracker, IndexedCollection};
pub use error::{Result, ShelfError};
pub use keys::KeyMetadataStore;
pub use persist::{MemoryBackend, PersistOptions, PersistenceCoordinator, StorageBackend};
pub use query::{CompiledQuery, Filter};
pub use store::{CollectionHandle, Store, StoreConfig};
pub use types::{Change, ChangeKind, ChangeRecord, Document, PersistResult, RestoreResult};
