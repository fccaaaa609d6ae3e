//! Action rule files.

pub mod registry;

pub use registry::{ActionRules, ActionSummary, RuleRegistry};
