//! Model definitions: the per-collection field list consumed when a
//! collection is constructed.
//!
//! A model names the primary-key fields (always indexed and unique), the
//! auto-generated fields (assigned from the key metadata store on insert),
//! extra unique constraints and binary indices, plus per-field type tags
//! used to validate documents on write.

pub mod builder;
pub mod definition;
pub mod validate;

pub use builder::{model, ModelBuilder};
pub use definition::{CollectionModel, FieldDef, FieldType, RemoteMapping};
pub use validate::{validate_document, validate_model};
