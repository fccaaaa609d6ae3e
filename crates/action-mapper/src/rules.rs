//! Typed, validated views of request and response rule sets.
//!
//! Rule sets arrive as plain JSON. Everything structural is checked here,
//! before the engine resolves a single leaf.

use serde_json::{Map, Value};

use crate::deep_map::try_deep_map;
use crate::selector::Selector;
use crate::types::{MappingError, MappingResult};

/// Suffix marking a request path segment as optional.
pub const OPTIONAL_SUFFIX: char = '?';

const DEFAULT_METHOD: &str = "GET";

/// One entry of a request rule set's `path` list.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEntry {
    /// The entry as written, without the optional marker.
    pub raw: String,
    pub selector: Selector,
    pub optional: bool,
}

/// A validated request rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRules {
    pub method: String,
    pub url: String,
    pub path: Vec<PathEntry>,
    pub query: Vec<(String, Value)>,
    pub headers: Vec<(String, Value)>,
    pub body: Option<Value>,
}

impl RequestRules {
    pub fn from_tree(rules: &Value) -> MappingResult<Self> {
        let map = as_mapping(rules, "request rule set")?;

        let method = match map.get("method") {
            None | Some(Value::Null) => DEFAULT_METHOD.to_string(),
            Some(Value::String(m)) if !m.trim().is_empty() => m.trim().to_ascii_uppercase(),
            Some(other) => return Err(malformed(format!("`method` must be a string, got {other}"))),
        };

        let url = match map.get("url") {
            Some(Value::String(url)) => url.clone(),
            Some(other) => return Err(malformed(format!("`url` must be a string, got {other}"))),
            None => return Err(malformed("`url` is required")),
        };
        classify(&url, "url")?;

        let path = match map.get("path") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .enumerate()
                .map(|(i, entry)| path_entry(entry, i))
                .collect::<MappingResult<_>>()?,
            Some(other) => return Err(malformed(format!("`path` must be a sequence, got {other}"))),
        };

        let query = shallow_section(map, "query")?;
        let headers = shallow_section(map, "headers")?;

        let body = match map.get("body") {
            None => None,
            Some(body) => {
                validate_template(body, "body")?;
                Some(body.clone())
            }
        };

        Ok(Self {
            method,
            url,
            path,
            query,
            headers,
            body,
        })
    }
}

/// A validated response rule set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseRules {
    pub headers: Option<Value>,
    pub body: Option<Value>,
    /// Literal values folded onto the result after mapping.
    pub defaults: Option<Value>,
}

impl ResponseRules {
    pub fn from_tree(rules: &Value) -> MappingResult<Self> {
        let map = as_mapping(rules, "response rule set")?;

        let mut out = Self::default();
        for (section, slot) in [("headers", &mut out.headers), ("body", &mut out.body)] {
            if let Some(template) = map.get(section) {
                validate_template(template, section)?;
                *slot = Some(template.clone());
            }
        }

        out.defaults = match map.get("defaults") {
            None | Some(Value::Null) => None,
            Some(defaults @ Value::Object(_)) => Some(defaults.clone()),
            Some(other) => return Err(malformed(format!("`defaults` must be a mapping, got {other}"))),
        };

        Ok(out)
    }
}

fn path_entry(entry: &Value, index: usize) -> MappingResult<PathEntry> {
    let Value::String(raw) = entry else {
        return Err(malformed(format!("`path[{index}]` must be a string, got {entry}")));
    };
    let location = format!("path[{index}]");
    // Only selectors and expressions can be optional; a literal keeps its `?`.
    if let Some(stripped) = raw.strip_suffix(OPTIONAL_SUFFIX) {
        let selector = classify(stripped, &location)?;
        if !selector.is_literal() {
            return Ok(PathEntry {
                raw: stripped.to_string(),
                selector,
                optional: true,
            });
        }
    }
    let selector = classify(raw, &location)?;
    Ok(PathEntry {
        raw: raw.clone(),
        selector,
        optional: false,
    })
}

fn shallow_section(map: &Map<String, Value>, section: &str) -> MappingResult<Vec<(String, Value)>> {
    let entries = match map.get(section) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(entries)) => entries,
        Some(other) => return Err(malformed(format!("`{section}` must be a mapping, got {other}"))),
    };

    entries
        .iter()
        .map(|(name, template)| {
            if let Value::Object(_) = template {
                return Err(malformed(format!("`{section}.{name}` must be a leaf")));
            }
            validate_template(template, &format!("{section}.{name}"))?;
            Ok((name.clone(), template.clone()))
        })
        .collect()
}

fn validate_template(template: &Value, section: &str) -> MappingResult<()> {
    try_deep_map(template, |location, leaf| {
        Selector::classify_value(leaf).map_err(|e| {
            malformed(format!("{}: {e}", rule_location(section, location)))
        })?;
        Ok(None)
    })
    .map(|_| ())
}

fn classify(raw: &str, location: &str) -> MappingResult<Selector> {
    Selector::classify(raw).map_err(|e| malformed(format!("{location}: {e}")))
}

fn as_mapping<'a>(rules: &'a Value, what: &str) -> MappingResult<&'a Map<String, Value>> {
    rules
        .as_object()
        .ok_or_else(|| malformed(format!("{what} must be a mapping")))
}

fn malformed(msg: impl Into<String>) -> MappingError {
    MappingError::MalformedRuleSet(msg.into())
}

/// Render a template location such as `body.items.0.name`.
pub(crate) fn rule_location(section: &str, location: &[String]) -> String {
    if location.is_empty() {
        section.to_string()
    } else {
        format!("{section}.{}", location.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_rules_full() {
        let rules = RequestRules::from_tree(&json!({
            "method": "post",
            "url": "http://example.com/api",
            "path": ["users", "$.id", "$.page?"],
            "query": {"q": "$.query"},
            "headers": {"accept": "application/json"},
            "body": {"name": "$.name"}
        }))
        .unwrap();

        assert_eq!(rules.method, "POST");
        assert_eq!(rules.path.len(), 3);
        assert!(rules.path[0].selector.is_literal());
        assert!(!rules.path[1].optional);
        assert!(rules.path[2].optional);
        assert_eq!(rules.path[2].raw, "$.page");
        assert_eq!(rules.query, vec![("q".to_string(), json!("$.query"))]);
        assert!(rules.body.is_some());
    }

    #[test]
    fn test_optional_marker_only_on_selectors() {
        let rules = RequestRules::from_tree(&json!({
            "url": "http://x",
            "path": ["search?", "{{ page }}?"]
        }))
        .unwrap();

        assert_eq!(rules.path[0].raw, "search?");
        assert!(!rules.path[0].optional);
        assert!(rules.path[0].selector.is_literal());
        assert_eq!(rules.path[1].raw, "{{ page }}");
        assert!(rules.path[1].optional);
    }

    #[test]
    fn test_request_rules_defaults_method() {
        let rules = RequestRules::from_tree(&json!({"url": "http://x"})).unwrap();
        assert_eq!(rules.method, "GET");
        assert!(rules.path.is_empty());
        assert!(rules.body.is_none());
    }

    #[test]
    fn test_request_rules_reject_malformed() {
        let cases = [
            json!([]),
            json!({}),
            json!({"url": 5}),
            json!({"url": "http://x", "path": "$.id"}),
            json!({"url": "http://x", "path": [1]}),
            json!({"url": "http://x", "query": {"a": {"b": "$.c"}}}),
            json!({"url": "http://x", "body": {"a": "$."}}),
            json!({"url": "$."}),
        ];
        for case in cases {
            let err = RequestRules::from_tree(&case).unwrap_err();
            assert!(matches!(err, MappingError::MalformedRuleSet(_)), "{case}: {err}");
        }
    }

    #[test]
    fn test_malformed_message_names_location() {
        let err = RequestRules::from_tree(&json!({
            "url": "http://x",
            "body": {"items": [{"name": "$[0"}]}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("body.items.0.name"), "{err}");
    }

    #[test]
    fn test_response_rules() {
        let rules = ResponseRules::from_tree(&json!({
            "body": {"foo": "$.result.bar"},
            "defaults": {"result": {"@type": "Thing"}}
        }))
        .unwrap();
        assert_eq!(rules.body, Some(json!({"foo": "$.result.bar"})));
        assert!(rules.headers.is_none());
        assert!(rules.defaults.is_some());

        assert!(ResponseRules::from_tree(&json!({"defaults": "x"})).is_err());
        assert!(ResponseRules::from_tree(&json!({"body": {"a": "$."}})).is_err());
    }
}
