//! The injected expression-evaluator capability.
//!
//! The core never evaluates code itself. Hosts register one [`Evaluator`] per
//! [`EvalMethod`]; the engine looks the evaluator up per call and passes the
//! bound value explicitly, so concurrent calls never share evaluator state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::types::{EvalMethod, EvaluatorError};

/// Evaluates `expression` with `bound` as its `$` root.
///
/// `Ok(None)` means the expression produced no value; the leaf is omitted.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expression: &str, bound: &Value) -> Result<Option<Value>, EvaluatorError>;
}

impl<F> Evaluator for F
where
    F: Fn(&str, &Value) -> Result<Option<Value>, EvaluatorError> + Send + Sync,
{
    fn evaluate(&self, expression: &str, bound: &Value) -> Result<Option<Value>, EvaluatorError> {
        self(expression, bound)
    }
}

/// Evaluators keyed by mode.
#[derive(Clone, Default)]
pub struct Evaluators {
    by_method: HashMap<EvalMethod, Arc<dyn Evaluator>>,
}

impl Evaluators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the evaluator for `method`.
    pub fn with(mut self, method: EvalMethod, evaluator: impl Evaluator + 'static) -> Self {
        self.by_method.insert(method, Arc::new(evaluator));
        self
    }

    pub fn insert(&mut self, method: EvalMethod, evaluator: Arc<dyn Evaluator>) {
        self.by_method.insert(method, evaluator);
    }

    pub fn get(&self, method: EvalMethod) -> Option<&dyn Evaluator> {
        self.by_method.get(&method).map(|e| e.as_ref())
    }

    pub fn methods(&self) -> Vec<EvalMethod> {
        let mut methods: Vec<_> = self.by_method.keys().copied().collect();
        methods.sort_by_key(|m| m.to_string());
        methods
    }
}

impl fmt::Debug for Evaluators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluators")
            .field("methods", &self.methods())
            .finish()
    }
}
