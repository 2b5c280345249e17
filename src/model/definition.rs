use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Document;

// ============================================================================
// Field types
// ============================================================================

/// Type tag carried by every field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// ISO 8601 timestamp string.
    Date,
    /// Any JSON value.
    Json,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Json => "json",
        }
    }
}

/// How a field is named and typed on the remote side of a sync descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMapping {
    pub name: String,
    #[serde(default)]
    pub remote_type: Option<String>,
}

// ============================================================================
// FieldDef
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_generate: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub read_only: bool,
    /// Extra uniqueness constraint (primary keys are always unique).
    #[serde(default)]
    pub unique: bool,
    /// Maintain a binary index (primary keys are always indexed).
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub remote: Option<RemoteMapping>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            primary_key: false,
            auto_generate: false,
            required: false,
            read_only: false,
            unique: false,
            indexed: false,
            remote: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Json)
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_generate(mut self) -> Self {
        self.auto_generate = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn remote(mut self, name: impl Into<String>, remote_type: Option<&str>) -> Self {
        self.remote = Some(RemoteMapping {
            name: name.into(),
            remote_type: remote_type.map(str::to_string),
        });
        self
    }

    /// Name of this field on the remote side.
    pub fn remote_name(&self) -> &str {
        self.remote.as_ref().map(|r| r.name.as_str()).unwrap_or(&self.name)
    }
}

// ============================================================================
// CollectionModel
// ============================================================================

/// Validated model for one collection. Produced by [`ModelBuilder::build`]
/// or deserialized and checked with [`validate_model`].
///
/// [`ModelBuilder::build`]: super::ModelBuilder::build
/// [`validate_model`]: super::validate_model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionModel {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl CollectionModel {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True if `path` names a model field, or a dotted path rooted at one.
    pub fn has_field(&self, path: &str) -> bool {
        let root = path.split('.').next().unwrap_or(path);
        self.field(root).is_some()
    }

    pub fn primary_key_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn auto_generated_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.auto_generate)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Single-field unique constraints outside the primary key.
    pub fn unique_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.unique && !(f.primary_key && self.has_single_primary_key()))
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Fields carrying a binary index: primary keys, unique and indexed fields.
    pub fn indexed_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.primary_key || f.indexed || f.unique)
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn read_only_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.read_only)
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn has_single_primary_key(&self) -> bool {
        self.fields.iter().filter(|f| f.primary_key).count() == 1
    }

    /// Primary-key value of `doc`: the bare value for a single key, an array
    /// of values (in field order) for a compound key.
    pub fn primary_key_of(&self, doc: &Document) -> Value {
        let pk = self.primary_key_fields();
        if pk.len() == 1 {
            return doc.get(pk[0]).cloned().unwrap_or(Value::Null);
        }
        Value::Array(
            pk.iter()
                .map(|f| doc.get(*f).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Rename remote field names to local ones. Fields unknown to the model
    /// pass through unchanged.
    pub fn to_local(&self, remote: &Document) -> Document {
        let mut local = remote.clone();
        for field in &self.fields {
            let remote_name = field.remote_name();
            if remote_name == field.name {
                continue;
            }
            if let Some(v) = local.remove(remote_name) {
                local.insert(field.name.clone(), v);
            }
        }
        local
    }

    /// Inverse of [`to_local`](Self::to_local).
    pub fn to_remote(&self, local: &Document) -> Document {
        let mut remote = local.clone();
        for field in &self.fields {
            let remote_name = field.remote_name();
            if remote_name == field.name {
                continue;
            }
            if let Some(v) = remote.remove(&field.name) {
                remote.insert(remote_name.to_string(), v);
            }
        }
        remote
    }
}

// ============================================================================
// Tests
// ============================================================================
