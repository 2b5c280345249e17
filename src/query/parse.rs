//! JSON filter parsing: `{"age": {"$gte": 21}, "name": "Alfred"}` → [`Filter`].

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::model::CollectionModel;

use super::types::{Condition, Filter};

/// Returns true if `value` is a non-empty object where ALL keys start with `$`.
pub fn is_operator(value: &Value) -> bool {
    match value.as_object() {
        Some(obj) if !obj.is_empty() => obj.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

/// Parse a JSON filter into a filter tree.
///
/// Top-level keys are ANDed. `$and`/`$or` take arrays of filters, `$not` a
/// single filter. A field value that is an operator object is expanded into
/// one condition per operator; any other value is shorthand for `$eq`.
///
/// When `model` is given, every referenced field must be declared in it.
pub fn parse_filter(filter: &Value, model: Option<&CollectionModel>) -> Result<Filter, QueryError> {
    let obj = filter
        .as_object()
        .ok_or_else(|| QueryError::Malformed(format!("filter must be an object, got {filter}")))?;
    parse_object(obj, model)
}

fn parse_object(obj: &Map<String, Value>, model: Option<&CollectionModel>) -> Result<Filter, QueryError> {
    let mut parts = Vec::with_capacity(obj.len());

    for (key, value) in obj {
        match key.as_str() {
            "$and" => parts.push(Filter::And(parse_list(key, value, model)?)),
            "$or" => parts.push(Filter::Or(parse_list(key, value, model)?)),
            "$not" => parts.push(Filter::Not(Box::new(parse_filter(value, model)?))),
            op if op.starts_with('$') => return Err(QueryError::UnknownOperator(op.to_string())),
            path => {
                check_field(path, model)?;
                parts.extend(parse_field(path, value)?);
            }
        }
    }

    Ok(match parts.len() {
        0 => Filter::All,
        1 => parts.pop().unwrap_or(Filter::All),
        _ => Filter::And(parts),
    })
}

fn parse_list(
    op: &str,
    value: &Value,
    model: Option<&CollectionModel>,
) -> Result<Vec<Filter>, QueryError> {
    let items = value
        .as_array()
        .ok_or_else(|| QueryError::Malformed(format!("{op} expects an array of filters")))?;
    items.iter().map(|f| parse_filter(f, model)).collect()
}

fn check_field(path: &str, model: Option<&CollectionModel>) -> Result<(), QueryError> {
    match model {
        Some(m) if !m.has_field(path) => Err(QueryError::UnknownField {
            collection: m.name.clone(),
            field: path.to_string(),
        }),
        _ => Ok(()),
    }
}

fn parse_field(path: &str, value: &Value) -> Result<Vec<Filter>, QueryError> {
    if !is_operator(value) {
        return Ok(vec![Filter::field(path, Condition::Eq(value.clone()))]);
    }
    let ops = value.as_object().into_iter().flatten();
    ops.map(|(op, operand)| Ok(Filter::field(path, parse_condition(op, operand)?)))
        .collect()
}

fn parse_condition(op: &str, operand: &Value) -> Result<Condition, QueryError> {
    Ok(match op {
        "$eq" => Condition::Eq(operand.clone()),
        "$ne" => Condition::Ne(operand.clone()),
        "$lt" => Condition::Lt(operand.clone()),
        "$lte" => Condition::Lte(operand.clone()),
        "$gt" => Condition::Gt(operand.clone()),
        "$gte" => Condition::Gte(operand.clone()),
        "$in" => Condition::In(array_operand(op, operand)?),
        "$nin" => Condition::Nin(array_operand(op, operand)?),
        "$regex" => {
            let pattern = operand
                .as_str()
                .ok_or_else(|| QueryError::Malformed("$regex expects a string pattern".into()))?;
            Condition::Regex(
                Regex::new(pattern).map_err(|e| QueryError::InvalidRegex(e.to_string()))?,
            )
        }
        "$exists" => Condition::Exists(
            operand
                .as_bool()
                .ok_or_else(|| QueryError::Malformed("$exists expects a boolean".into()))?,
        ),
        other => return Err(QueryError::UnknownOperator(other.to_string())),
    })
}

fn array_operand(op: &str, operand: &Value) -> Result<Vec<Value>, QueryError> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| QueryError::Malformed(format!("{op} expects an array")))
}

// ============================================================================
// Tests
// ============================================================================
