use std::collections::HashMap;

use serde_json::Value;

use crate::query::operators::get_field_value;
use crate::types::Document;

/// Hashable canonical form of a JSON value. Integral floats collapse onto
/// integers so `1` and `1.0` collide; strings stay quoted so `"1"` does not.
pub fn canonical_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_key).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_key(v)))
                .collect();
            parts.sort();
            format!("{{{}}}", parts.join(","))
        }
        other => other.to_string(),
    }
}

/// Uniqueness constraint over one field, or jointly over several.
///
/// Documents whose constrained value is null or missing (all fields, for a
/// compound constraint) are not tracked and never conflict.
#[derive(Debug, Clone)]
pub struct UniqueIndex {
    fields: Vec<String>,
    keys: HashMap<String, usize>,
}

impl UniqueIndex {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            keys: HashMap::new(),
        }
    }

    pub fn single(field: impl Into<String>) -> Self {
        Self::new(vec![field.into()])
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Display name: the field, or fields joined with `+`.
    pub fn name(&self) -> String {
        self.fields.join("+")
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The constrained value of `doc`, or `None` when it is unconstrained.
    pub fn value_of(&self, doc: &Document) -> Option<Value> {
        let values: Vec<Value> = self
            .fields
            .iter()
            .map(|f| get_field_value(doc, f).cloned().unwrap_or(Value::Null))
            .collect();
        if values.iter().all(Value::is_null) {
            return None;
        }
        Some(if values.len() == 1 {
            values.into_iter().next().unwrap_or(Value::Null)
        } else {
            Value::Array(values)
        })
    }

    /// Position of the document holding `value`.
    pub fn get(&self, value: &Value) -> Option<usize> {
        self.keys.get(&canonical_key(value)).copied()
    }

    /// The conflicting value if `doc` collides with a document other than
    /// the one at `exclude`.
    pub fn conflict(&self, doc: &Document, exclude: Option<usize>) -> Option<Value> {
        let value = self.value_of(doc)?;
        match self.keys.get(&canonical_key(&value)) {
            Some(&pos) if Some(pos) != exclude => Some(value),
            _ => None,
        }
    }

    /// Record `doc` at `pos`. Later entries for the same value replace
    /// earlier ones (used by trusted bulk loads).
    pub fn insert(&mut self, doc: &Document, pos: usize) {
        if let Some(value) = self.value_of(doc) {
            self.keys.insert(canonical_key(&value), pos);
        }
    }

    pub fn remove(&mut self, doc: &Document, pos: usize) {
        if let Some(value) = self.value_of(doc) {
            let key = canonical_key(&value);
            if self.keys.get(&key) == Some(&pos) {
                self.keys.remove(&key);
            }
        }
    }

    pub fn shift_down(&mut self, removed: usize) {
        for pos in self.keys.values_mut() {
            if *pos > removed {
                *pos -= 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn rebuild(&mut self, docs: &[Document]) {
        self.keys.clear();
        for (pos, doc) in docs.iter().enumerate() {
            self.insert(doc, pos);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
