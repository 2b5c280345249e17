//! Condition evaluation for the query engine.
//! Mongo-style comparison semantics with array lifting.

use std::cmp::Ordering;

use serde_json::Value;

use super::types::{Condition, Filter};
use crate::types::Document;

// ============================================================================
// Value Comparison
// ============================================================================

/// Compare two JSON values for ordering.
///
/// - Both Null → Equal
/// - a is Null → Greater (nulls sort to end)
/// - b is Null → Less
/// - Both numbers → f64 comparison (NaN treated as Equal)
/// - Both strings → lexicographic (codepoint order)
/// - Both booleans → false < true
/// - Cross-type → type rank: number(0), string(1), bool(2), other(3)
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(na), Value::Number(nb)) => {
            let fa = na.as_f64().unwrap_or(f64::NAN);
            let fb = nb.as_f64().unwrap_or(f64::NAN);
            fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
        }
        (Value::String(sa), Value::String(sb)) => sa.cmp(sb),
        (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 2,
        _ => 3,
    }
}

/// Equality used by `$eq`/`$in`: numbers compare by value (`1 == 1.0`),
/// everything else structurally.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(na), Value::Number(nb)) => na.as_f64() == nb.as_f64(),
        _ => a == b,
    }
}

/// True for arrays and objects, which binary indices cannot order meaningfully.
pub fn is_composite(v: &Value) -> bool {
    v.is_array() || v.is_object()
}

// ============================================================================
// Field Path Resolution
// ============================================================================

/// Get a nested value from a document using a dot-separated path.
/// Returns `None` if any path segment is missing or the parent is not an object.
pub fn get_field_value<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

// ============================================================================
// Condition Evaluation
// ============================================================================

fn ordered(value: &Value, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    if value.is_null() || operand.is_null() {
        return false;
    }
    accept(compare_values(value, operand))
}

/// Evaluate a condition against a scalar (no array lifting).
fn evaluate_scalar(value: &Value, condition: &Condition) -> bool {
    match condition {
        Condition::Eq(operand) => values_equal(value, operand),
        Condition::Ne(operand) => !values_equal(value, operand),
        Condition::Gt(operand) => ordered(value, operand, |o| o == Ordering::Greater),
        Condition::Gte(operand) => ordered(value, operand, |o| o != Ordering::Less),
        Condition::Lt(operand) => ordered(value, operand, |o| o == Ordering::Less),
        Condition::Lte(operand) => ordered(value, operand, |o| o != Ordering::Greater),
        Condition::In(items) => items.iter().any(|item| values_equal(value, item)),
        Condition::Nin(items) => !items.iter().any(|item| values_equal(value, item)),
        Condition::Regex(re) => value.as_str().is_some_and(|s| re.is_match(s)),
        Condition::Exists(_) => true,
    }
}

/// Evaluate a condition against the (possibly absent) value at a path.
///
/// Array values are lifted: `$eq`, ordering operators, `$in` and `$regex`
/// match if ANY element matches; `$ne` and `$nin` require ALL elements to
/// satisfy them. An operand that is itself an array compares whole-value.
pub fn evaluate_condition(value: Option<&Value>, condition: &Condition) -> bool {
    if let Condition::Exists(want) = condition {
        return value.is_some() == *want;
    }
    let value = value.unwrap_or(&Value::Null);

    if let Value::Array(items) = value {
        let operand_is_array = matches!(
            condition,
            Condition::Eq(Value::Array(_)) | Condition::Ne(Value::Array(_))
        );
        if !operand_is_array {
            return match condition {
                Condition::Ne(_) | Condition::Nin(_) => {
                    items.iter().all(|v| evaluate_scalar(v, condition))
                }
                _ => items.iter().any(|v| evaluate_scalar(v, condition)),
            };
        }
    }
    evaluate_scalar(value, condition)
}

/// Evaluate a filter tree against a document.
pub fn matches_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::All => true,
        Filter::Field { path, condition } => {
            evaluate_condition(get_field_value(doc, path), condition)
        }
        Filter::And(parts) => parts.iter().all(|f| matches_filter(doc, f)),
        Filter::Or(parts) => parts.iter().any(|f| matches_filter(doc, f)),
        Filter::Not(inner) => !matches_filter(doc, inner),
    }
}

// ============================================================================
// Tests (inline unit tests)
// ============================================================================
