//! Built-in expression evaluators.
//!
//! A small expression language for `{{ ... }}` rule leaves: literals, `$`
//! selectors, `+` and a fixed set of functions. The `eval` mode also reaches
//! the host (`env`, `now`); the `sandbox` mode does not and runs under
//! length, nesting and step limits.

pub mod interpreter;
pub mod parser;

use action_mapper::{EvalMethod, Evaluator, EvaluatorError, Evaluators};
use serde_json::Value;

pub use interpreter::Limits;

/// Parses and runs expressions under a fixed set of limits.
#[derive(Debug, Clone, Copy)]
pub struct ExprEvaluator {
    limits: Limits,
}

impl ExprEvaluator {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn unrestricted() -> Self {
        Self::new(Limits::unrestricted())
    }

    pub fn sandboxed() -> Self {
        Self::new(Limits::sandboxed())
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }
}

impl Evaluator for ExprEvaluator {
    fn evaluate(&self, expression: &str, bound: &Value) -> Result<Option<Value>, EvaluatorError> {
        if let Some(max) = self.limits.max_len {
            if expression.len() > max {
                return Err(EvaluatorError::new(format!(
                    "expression is {} bytes, limit is {max}",
                    expression.len()
                )));
            }
        }
        let expr = parser::parse(expression, self.limits.max_depth)?;
        interpreter::Interpreter::new(bound, self.limits).eval(&expr)
    }
}

/// Evaluators for both modes.
pub fn builtin_evaluators() -> Evaluators {
    Evaluators::new()
        .with(EvalMethod::Eval, ExprEvaluator::unrestricted())
        .with(EvalMethod::Sandbox, ExprEvaluator::sandboxed())
}
