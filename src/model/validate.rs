use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{ValidationError, ValidationErrors};
use crate::types::Document;

use super::definition::{CollectionModel, FieldType};

// ============================================================================
// Regexes
// ============================================================================

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("name regex is valid"))
}

fn iso_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}(?:T\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?(?:Z|[+-]\d{2}:\d{2})?)?$")
            .expect("ISO date regex is valid")
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Date => value.as_str().is_some_and(|s| iso_date_regex().is_match(s)),
        FieldType::Json => true,
    }
}

// ============================================================================
// Model validation
// ============================================================================

/// Check a model definition for structural problems.
pub fn validate_model(model: &CollectionModel) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if !name_regex().is_match(&model.name) {
        errors.push(ValidationError::new(
            &model.name,
            "collection name of letters, digits and underscores",
            format!("{:?}", model.name),
        ));
    }

    if model.fields.iter().all(|f| !f.primary_key) {
        errors.push(ValidationError::new(
            &model.name,
            "at least one primary key field",
            "none",
        ));
    }

    let mut seen = HashSet::new();
    for field in &model.fields {
        let path = format!("{}.{}", model.name, field.name);
        if !name_regex().is_match(&field.name) {
            errors.push(ValidationError::new(
                &path,
                "field name of letters, digits and underscores",
                format!("{:?}", field.name),
            ));
        }
        if !seen.insert(field.name.as_str()) {
            errors.push(ValidationError::new(&path, "unique field name", "duplicate"));
        }
        if field.auto_generate && field.field_type != FieldType::Integer {
            errors.push(ValidationError::new(
                &path,
                "integer type for auto-generated field",
                field.field_type.name(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

// ============================================================================
// Document validation
// ============================================================================

/// Validate `doc` against the model's required flags and type tags.
/// Fields not declared in the model are accepted as-is.
pub fn validate_document(model: &CollectionModel, doc: &Document) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    for field in &model.fields {
        match doc.get(&field.name) {
            None | Some(Value::Null) => {
                if (field.required || field.primary_key) && !field.auto_generate {
                    let received = if doc.contains_key(&field.name) { "null" } else { "missing" };
                    errors.push(ValidationError::new(
                        &field.name,
                        field.field_type.name(),
                        received,
                    ));
                }
            }
            Some(value) => {
                if !matches_type(field.field_type, value) {
                    errors.push(ValidationError::new(
                        &field.name,
                        field.field_type.name(),
                        type_name(value),
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

// ============================================================================
// Tests
// ============================================================================
