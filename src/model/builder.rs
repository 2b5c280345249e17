//! Fluent model builder.
//!
//! ```
//! use shelfdb::model::{model, FieldDef};
//!
//! let users = model("users")
//!     .field(FieldDef::integer("id").primary_key().auto_generate())
//!     .field(FieldDef::string("email").required().unique())
//!     .build()
//!     .unwrap();
//! assert_eq!(users.primary_key_fields(), vec!["id"]);
//! ```

use crate::error::{ValidationError, ValidationErrors};

use super::definition::{CollectionModel, FieldDef, FieldType};
use super::validate::validate_model;

/// Collection model under construction.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    name: String,
    fields: Vec<FieldDef>,
    errors: Vec<ValidationError>,
}

impl ModelBuilder {
    /// Append a field definition. Field order is preserved; it decides the
    /// element order of compound primary keys.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Mark an already-declared field as unique.
    pub fn unique(self, name: &str) -> Self {
        self.modify(name, |f| f.unique = true)
    }

    /// Mark an already-declared field as indexed.
    pub fn index(self, name: &str) -> Self {
        self.modify(name, |f| f.indexed = true)
    }

    /// Shorthand for an auto-generated integer primary key.
    pub fn auto_key(self, name: &str) -> Self {
        self.field(FieldDef::new(name, FieldType::Integer).primary_key().auto_generate())
    }

    fn modify(mut self, name: &str, f: impl FnOnce(&mut FieldDef)) -> Self {
        match self.fields.iter_mut().find(|fd| fd.name == name) {
            Some(field) => f(field),
            None => self.errors.push(ValidationError::new(
                format!("{}.{name}", self.name),
                "declared field",
                "unknown field",
            )),
        }
        self
    }

    /// Finalize the model, reporting every problem at once.
    pub fn build(self) -> Result<CollectionModel, ValidationErrors> {
        let model = CollectionModel {
            name: self.name,
            fields: self.fields,
        };
        let mut errors = self.errors;
        if let Err(ValidationErrors(more)) = validate_model(&model) {
            errors.extend(more);
        }
        if errors.is_empty() {
            Ok(model)
        } else {
            Err(ValidationErrors(errors))
        }
    }
}

/// Start building a model for the collection `name`.
pub fn model(name: &str) -> ModelBuilder {
    ModelBuilder {
        name: name.to_string(),
        fields: Vec::new(),
        errors: Vec::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
