// trustlayer-core/src/walker.rs
//! Structure-preserving transforms over JSON trees.
//!
//! Only string scalars are visited. Object keys, numbers, booleans and nulls
//! pass through as they are.

use serde_json::{Map, Value};

/// Rebuilds `value`, replacing every string leaf with `visit(leaf)`.
pub fn walk<F>(value: Value, visit: &mut F) -> Value
where
    F: FnMut(String) -> String,
{
    match value {
        Value::String(s) => Value::String(visit(s)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| walk(v, visit)).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, walk(v, visit))).collect()),
        other => other,
    }
}

/// Like [`walk`], but stops at the first error returned by `visit`.
pub fn try_walk<F, E>(value: Value, visit: &mut F) -> Result<Value, E>
where
    F: FnMut(String) -> Result<String, E>,
{
    Ok(match value {
        Value::String(s) => Value::String(visit(s)?),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(try_walk(item, visit)?);
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key, try_walk(item, visit)?);
            }
            Value::Object(out)
        }
        other => other,
    })
}

/// Number of string leaves in `value`.
pub fn count_string_leaves(value: &Value) -> usize {
    match value {
        Value::String(_) => 1,
        Value::Array(items) => items.iter().map(count_string_leaves).sum(),
        Value::Object(map) => map.values().map(count_string_leaves).sum(),
        _ => 0,
    }
}

/// Pushes every object key and string leaf of `value` onto `out`.
pub fn collect_text<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, out)),
        Value::Object(map) => {
            for (key, item) in map {
                out.push(key);
                collect_text(item, out);
            }
        }
        _ => {}
    }
}
