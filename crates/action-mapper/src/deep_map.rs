//! Shape-preserving leaf transforms over JSON templates.

use std::convert::Infallible;

use serde_json::{Map, Value};

/// Replace every leaf of `template` with `transform(leaf)`.
///
/// Sequences stay sequences and mappings keep their keys. A leaf for which the
/// transform returns `None` is omitted from its container. Returns `None` only
/// when `template` is itself a leaf that resolved to nothing.
pub fn deep_map<F>(template: &Value, mut transform: F) -> Option<Value>
where
    F: FnMut(&Value) -> Option<Value>,
{
    let result: Result<_, Infallible> = try_deep_map(template, |_, leaf| Ok(transform(leaf)));
    result.unwrap_or_else(|never| match never {})
}

/// Fallible [`deep_map`] whose transform also receives the leaf's location.
///
/// The location lists mapping keys and sequence indices from the root.
pub fn try_deep_map<F, E>(template: &Value, mut transform: F) -> Result<Option<Value>, E>
where
    F: FnMut(&[String], &Value) -> Result<Option<Value>, E>,
{
    let mut location = Vec::new();
    walk(template, &mut location, &mut transform)
}

fn walk<F, E>(node: &Value, location: &mut Vec<String>, transform: &mut F) -> Result<Option<Value>, E>
where
    F: FnMut(&[String], &Value) -> Result<Option<Value>, E>,
{
    match node {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                location.push(i.to_string());
                let mapped = walk(item, location, transform);
                location.pop();
                if let Some(v) = mapped? {
                    out.push(v);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                location.push(key.clone());
                let mapped = walk(item, location, transform);
                location.pop();
                if let Some(v) = mapped? {
                    out.insert(key.clone(), v);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        leaf => transform(location, leaf),
    }
}
