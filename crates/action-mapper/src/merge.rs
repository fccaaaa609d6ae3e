//! Non-destructive deep merge of mapping results into an existing target.

use regex::Regex;
use serde_json::Value;

use crate::path::Shape;

/// Fold `source` into `target` without overwriting anything `target` defines.
///
/// - keys missing (or `null`) in `target` receive a copy of the source value;
/// - keys present on both sides recurse when the source value is a container;
/// - a sequence `target` receives the merge on every element;
/// - keys matching `exclude` are skipped at every depth.
pub fn merge(target: &mut Value, source: &Value, exclude: Option<&Regex>) {
    match target {
        Value::Array(items) => {
            for item in items.iter_mut() {
                merge(item, source, exclude);
            }
        }
        Value::Object(map) => {
            let Value::Object(source) = source else {
                return;
            };
            for (key, value) in source {
                if exclude.is_some_and(|re| re.is_match(key)) {
                    continue;
                }
                match Shape::of(map.get(key)) {
                    Shape::Absent => {
                        map.insert(key.clone(), filtered_clone(value, exclude));
                    }
                    _ if Shape::of(Some(value)).is_container() => {
                        if let Some(existing) = map.get_mut(key) {
                            merge(existing, value, exclude);
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn filtered_clone(value: &Value, exclude: Option<&Regex>) -> Value {
    let Some(re) = exclude else {
        return value.clone();
    };
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !re.is_match(key))
                .map(|(key, v)| (key.clone(), filtered_clone(v, exclude)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items.iter().map(|v| filtered_clone(v, exclude)).collect(),
        ),
        other => other.clone(),
    }
}
