//! Classification of rule-set leaves into selectors, expressions, and literals.

use serde_json::Value;

use crate::path::{Path, PathError};

/// Opening marker of an embedded expression.
pub const EXPRESSION_OPEN: &str = "{{";
/// Closing marker of an embedded expression.
pub const EXPRESSION_CLOSE: &str = "}}";

/// What a rule leaf asks the engine to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// `$.a.b` or `$[0]`: a path rooted at the bound value.
    Path(Path),
    /// `{{ ... }}`: code handed to the evaluator.
    Expression(String),
    /// Anything else, passed through unchanged.
    Literal,
}

impl Selector {
    /// Classify a string leaf.
    pub fn classify(raw: &str) -> Result<Self, PathError> {
        if let Some(rest) = pure_selector_body(raw) {
            return Ok(Selector::Path(Path::parse(rest)?));
        }
        if let Some(expr) = expression_body(raw) {
            return Ok(Selector::Expression(expr.to_string()));
        }
        Ok(Selector::Literal)
    }

    /// Classify any leaf; non-string leaves are always literals.
    pub fn classify_value(value: &Value) -> Result<Self, PathError> {
        match value {
            Value::String(s) => Selector::classify(s),
            _ => Ok(Selector::Literal),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Selector::Literal)
    }
}

/// Whether `raw` starts with the pure-selector anchor.
pub fn is_pure_selector(raw: &str) -> bool {
    pure_selector_body(raw).is_some()
}

fn pure_selector_body(raw: &str) -> Option<&str> {
    if raw.starts_with("$.") || raw.starts_with("$[") {
        Some(&raw[1..])
    } else {
        None
    }
}

fn expression_body(raw: &str) -> Option<&str> {
    raw.trim()
        .strip_prefix(EXPRESSION_OPEN)?
        .strip_suffix(EXPRESSION_CLOSE)
        .map(str::trim)
}
