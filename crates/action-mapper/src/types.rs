//! Core data types for request descriptors, response envelopes, and mapping options.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::path::PathError;

/// Response header carrying the upstream HTTP status code.
pub const STATUS_HEADER: &str = ":status";

/// `actionStatus` value written when the upstream call failed.
pub const FAILED_ACTION_STATUS: &str = "FailedActionStatus";

/// `actionStatus` value written by the gateway after a successful invocation.
pub const COMPLETED_ACTION_STATUS: &str = "CompletedActionStatus";

/// Keys never merged into a result unless the caller overrides the pattern.
pub const DEFAULT_EXCLUDE_KEYS: &str = "^@context$";

/// A concrete outbound HTTP request built from an action invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// The HTTP reply as seen by the response mapping phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub body: Value,
}

impl ResponseEnvelope {
    /// Build an envelope with the status stored under [`STATUS_HEADER`].
    pub fn new(status: u16, mut headers: Map<String, Value>, body: Value) -> Self {
        headers.insert(STATUS_HEADER.to_string(), Value::from(status));
        Self { headers, body }
    }

    /// The upstream status, if the caller recorded one.
    pub fn status(&self) -> Option<u16> {
        match self.headers.get(STATUS_HEADER)? {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// A missing status counts as success.
    pub fn is_success(&self) -> bool {
        self.status().map_or(true, |s| (200..300).contains(&s))
    }
}

/// Which evaluator handles embedded expressions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMethod {
    /// Unrestricted evaluator.
    Eval,
    /// Resource-limited evaluator without host access.
    #[default]
    Sandbox,
}

impl fmt::Display for EvalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalMethod::Eval => f.write_str("eval"),
            EvalMethod::Sandbox => f.write_str("sandbox"),
        }
    }
}

impl FromStr for EvalMethod {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eval" => Ok(EvalMethod::Eval),
            "sandbox" | "vm" => Ok(EvalMethod::Sandbox),
            other => Err(MappingError::UnknownEvaluator(other.to_string())),
        }
    }
}

/// Per-call configuration for the mapping engine.
#[derive(Debug, Clone)]
pub struct MappingOptions {
    pub eval_method: EvalMethod,
    /// Keys matching this pattern are skipped when merging into the target.
    pub exclude_keys: Option<Regex>,
    /// Identifier of the action being answered, stamped as `@id` on results.
    pub action_id: Option<String>,
}

impl MappingOptions {
    pub fn with_eval_method(mut self, eval_method: EvalMethod) -> Self {
        self.eval_method = eval_method;
        self
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn with_exclude_keys(mut self, exclude_keys: Option<Regex>) -> Self {
        self.exclude_keys = exclude_keys;
        self
    }
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            eval_method: EvalMethod::default(),
            exclude_keys: Some(Regex::new(DEFAULT_EXCLUDE_KEYS).expect("default pattern is valid")),
            action_id: None,
        }
    }
}

/// Failure raised by an injected evaluator.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct EvaluatorError(pub String);

impl EvaluatorError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors that can occur while mapping.
#[derive(thiserror::Error, Debug)]
pub enum MappingError {
    #[error("Malformed rule set: {0}")]
    MalformedRuleSet(String),

    #[error("Missing required field for {rule_path}: {selector}")]
    MissingField { rule_path: String, selector: String },

    #[error("Evaluator failure at {rule_path} in `{expression}`: {source}")]
    Evaluator {
        expression: String,
        rule_path: String,
        #[source]
        source: EvaluatorError,
    },

    #[error("No evaluator registered for mode: {0}")]
    UnknownEvaluator(String),

    #[error("Merge target must be a mapping, got {0}")]
    InvalidTarget(String),

    #[error("Invalid path: {0}")]
    Path(#[from] PathError),
}

/// Convenience result type.
pub type MappingResult<T> = Result<T, MappingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_from_number_and_string() {
        let env = ResponseEnvelope::new(404, Map::new(), Value::Null);
        assert_eq!(env.status(), Some(404));
        assert!(!env.is_success());

        let env: ResponseEnvelope =
            serde_json::from_value(json!({"headers": {":status": "201"}, "body": {}})).unwrap();
        assert_eq!(env.status(), Some(201));
        assert!(env.is_success());
    }

    #[test]
    fn test_missing_status_is_success() {
        let env: ResponseEnvelope = serde_json::from_value(json!({"body": [1]})).unwrap();
        assert_eq!(env.status(), None);
        assert!(env.is_success());
    }

    #[test]
    fn test_eval_method_parse() {
        assert_eq!("eval".parse::<EvalMethod>().unwrap(), EvalMethod::Eval);
        assert_eq!("Sandbox".parse::<EvalMethod>().unwrap(), EvalMethod::Sandbox);
        assert!("lua".parse::<EvalMethod>().is_err());
        assert_eq!(serde_json::to_value(EvalMethod::Eval).unwrap(), json!("eval"));
    }

    #[test]
    fn test_default_options_exclude_context() {
        let opts = MappingOptions::default();
        let re = opts.exclude_keys.unwrap();
        assert!(re.is_match("@context"));
        assert!(!re.is_match("@type"));
    }
}
