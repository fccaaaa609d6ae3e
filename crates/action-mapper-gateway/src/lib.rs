//! ActionMapper gateway: invoke semantic actions against plain REST APIs.

pub mod config;
pub mod dispatch;
pub mod eval;
pub mod executor;
pub mod rest;
pub mod rules;
pub mod types;

pub use config::{resolve_rules_dir, GatewayConfig};
pub use dispatch::{HttpDispatch, ReqwestDispatcher};
pub use eval::{builtin_evaluators, ExprEvaluator};
pub use executor::ActionExecutor;
pub use rules::{ActionRules, RuleRegistry};
pub use types::{GatewayError, GatewayResult};
