//! Action rule loading and lookup.

use std::collections::BTreeMap;
use std::path::Path;

use action_mapper::{RequestRules, ResponseRules};
use serde::Serialize;
use serde_json::Value;

use crate::config::CONFIG_FILE;
use crate::types::{GatewayError, GatewayResult};

/// Validated rules for one action, loaded from `<action>.json`.
#[derive(Debug, Clone)]
pub struct ActionRules {
    pub name: String,
    pub request: RequestRules,
    /// Applied in order to every reply.
    pub response: Vec<ResponseRules>,
}

impl ActionRules {
    /// Parse an action file of the form `{"request": {...}, "response": {...} | [...]}`.
    pub fn from_tree(name: &str, file: &Value) -> GatewayResult<Self> {
        let request = file
            .get("request")
            .ok_or_else(|| GatewayError::Config(format!("{name}: `request` is required")))?;
        let request = RequestRules::from_tree(request)?;

        let response = match file.get("response") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(sets)) => sets
                .iter()
                .map(ResponseRules::from_tree)
                .collect::<Result<_, _>>()?,
            Some(set) => vec![ResponseRules::from_tree(set)?],
        };

        Ok(Self {
            name: name.to_string(),
            request,
            response,
        })
    }

    pub fn summary(&self) -> ActionSummary {
        ActionSummary {
            name: self.name.clone(),
            method: self.request.method.clone(),
            url: self.request.url.clone(),
            response_rule_sets: self.response.len(),
        }
    }
}

/// Listing entry for an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSummary {
    pub name: String,
    pub method: String,
    pub url: String,
    pub response_rule_sets: usize,
}

/// All actions known to the gateway, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    actions: BTreeMap<String, ActionRules>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` action file in `dir`.
    ///
    /// A missing directory yields an empty registry. Any malformed file fails
    /// the whole load with the file name in the message.
    pub fn load_dir(dir: &Path) -> GatewayResult<Self> {
        let mut registry = Self::new();
        if !dir.is_dir() {
            tracing::warn!(path = %dir.display(), "rules directory not found");
            return Ok(registry);
        }

        let mut files: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter(|p| p.file_name().is_some_and(|n| n != CONFIG_FILE))
            .collect();
        files.sort();

        for file in files {
            let Some(name) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = std::fs::read_to_string(&file)?;
            let tree: Value = serde_json::from_str(&raw)
                .map_err(|e| GatewayError::Config(format!("{}: {e}", file.display())))?;
            registry.insert(name, &tree).map_err(|e| {
                GatewayError::Config(format!("{}: {e}", file.display()))
            })?;
        }

        tracing::info!(path = %dir.display(), actions = registry.len(), "loaded action rules");
        Ok(registry)
    }

    /// Validate and register an action, replacing any previous one of the same name.
    pub fn insert(&mut self, name: &str, file: &Value) -> GatewayResult<()> {
        let rules = ActionRules::from_tree(name, file)?;
        self.actions.insert(name.to_string(), rules);
        Ok(())
    }

    pub fn get(&self, name: &str) -> GatewayResult<&ActionRules> {
        self.actions
            .get(name)
            .ok_or_else(|| GatewayError::ActionNotFound(name.to_string()))
    }

    pub fn list(&self) -> Vec<ActionSummary> {
        self.actions.values().map(ActionRules::summary).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_and_multiple_response_sets() {
        let one = ActionRules::from_tree(
            "a",
            &json!({"request": {"url": "http://x"}, "response": {"body": {"x": "$.x"}}}),
        )
        .unwrap();
        assert_eq!(one.response.len(), 1);

        let many = ActionRules::from_tree(
            "b",
            &json!({
                "request": {"url": "http://x"},
                "response": [{"body": {"x": "$.x"}}, {"defaults": {"y": 1}}]
            }),
        )
        .unwrap();
        assert_eq!(many.response.len(), 2);

        let none = ActionRules::from_tree("c", &json!({"request": {"url": "http://x"}})).unwrap();
        assert!(none.response.is_empty());
    }

    #[test]
    fn test_missing_request_is_config_error() {
        let err = ActionRules::from_tree("a", &json!({"response": {}})).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn test_lookup() {
        let mut registry = RuleRegistry::new();
        registry
            .insert("search", &json!({"request": {"method": "get", "url": "http://x"}}))
            .unwrap();

        assert_eq!(registry.get("search").unwrap().request.method, "GET");
        assert!(matches!(
            registry.get("missing"),
            Err(GatewayError::ActionNotFound(_))
        ));
        assert_eq!(registry.names(), vec!["search"]);
        assert_eq!(registry.list()[0].url, "http://x");
    }

    #[test]
    fn test_load_missing_dir_is_empty() {
        let registry = RuleRegistry::load_dir(Path::new("/nonexistent/action-rules")).unwrap();
        assert!(registry.is_empty());
    }
}
