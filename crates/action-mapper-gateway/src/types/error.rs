//! Error types and wire error codes for the gateway.

use action_mapper::MappingError;
use serde_json::{json, Value};

/// Machine-readable error codes returned in error bodies.
pub mod error_codes {
    pub const MALFORMED_RULES: &str = "E_MALFORMED_RULES";
    pub const MISSING_FIELD: &str = "E_MISSING_FIELD";
    pub const EVALUATOR_FAILED: &str = "E_EVALUATOR_FAILED";
    pub const UNKNOWN_EVALUATOR: &str = "E_UNKNOWN_EVALUATOR";
    pub const ACTION_NOT_FOUND: &str = "E_ACTION_NOT_FOUND";
    pub const INVALID_PARAMS: &str = "E_INVALID_PARAMS";
    pub const DISPATCH_FAILED: &str = "E_DISPATCH_FAILED";
    pub const INTERNAL: &str = "E_INTERNAL";
}

/// All errors that can occur in the gateway.
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        use error_codes::*;
        match self {
            GatewayError::Mapping(e) => match e {
                MappingError::MalformedRuleSet(_) | MappingError::Path(_) => MALFORMED_RULES,
                MappingError::MissingField { .. } => MISSING_FIELD,
                MappingError::Evaluator { .. } => EVALUATOR_FAILED,
                MappingError::UnknownEvaluator(_) => UNKNOWN_EVALUATOR,
                MappingError::InvalidTarget(_) => INVALID_PARAMS,
            },
            GatewayError::ActionNotFound(_) => ACTION_NOT_FOUND,
            GatewayError::InvalidParams(_) | GatewayError::Json(_) => INVALID_PARAMS,
            GatewayError::Dispatch(_) => DISPATCH_FAILED,
            GatewayError::Config(_) | GatewayError::Io(_) => INTERNAL,
        }
    }

    /// HTTP status used when this error is returned by the REST API.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Mapping(e) => match e {
                MappingError::MissingField { .. } | MappingError::Evaluator { .. } => 422,
                MappingError::InvalidTarget(_) => 400,
                _ => 500,
            },
            GatewayError::ActionNotFound(_) => 404,
            GatewayError::InvalidParams(_) | GatewayError::Json(_) => 400,
            GatewayError::Dispatch(_) => 502,
            GatewayError::Config(_) | GatewayError::Io(_) => 500,
        }
    }

    pub fn to_json_body(&self) -> Value {
        json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Dispatch(e.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use action_mapper::EvaluatorError;

    #[test]
    fn test_status_codes() {
        let missing = GatewayError::from(MappingError::MissingField {
            rule_path: "path[0]".into(),
            selector: "$.id".into(),
        });
        assert_eq!(missing.status_code(), 422);
        assert_eq!(missing.code(), error_codes::MISSING_FIELD);

        let eval = GatewayError::from(MappingError::Evaluator {
            expression: "x".into(),
            rule_path: "body".into(),
            source: EvaluatorError::new("bad"),
        });
        assert_eq!(eval.status_code(), 422);

        let malformed = GatewayError::from(MappingError::MalformedRuleSet("url".into()));
        assert_eq!(malformed.status_code(), 500);
        assert_eq!(GatewayError::ActionNotFound("x".into()).status_code(), 404);
        assert_eq!(GatewayError::Dispatch("down".into()).status_code(), 502);

        let target = GatewayError::from(MappingError::InvalidTarget("[]".into()));
        assert_eq!(target.status_code(), 400);
        assert_eq!(target.code(), error_codes::INVALID_PARAMS);
    }

    #[test]
    fn test_json_body() {
        let body = GatewayError::ActionNotFound("search".into()).to_json_body();
        assert_eq!(body["error"]["code"], "E_ACTION_NOT_FOUND");
        assert_eq!(body["error"]["message"], "Action not found: search");
    }
}
