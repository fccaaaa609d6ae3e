//! ActionMapper: turns semantic action invocations into HTTP requests, and HTTP replies back into results.

pub mod deep_map;
pub mod engine;
pub mod evaluator;
pub mod merge;
pub mod path;
pub mod rules;
pub mod selector;
pub mod types;

pub use deep_map::{deep_map, try_deep_map};
pub use engine::MappingEngine;
pub use evaluator::{Evaluator, Evaluators};
pub use merge::merge;
pub use path::{get, set, Path, PathError, Segment, Shape, MAX_INDEX_GAP};
pub use rules::{PathEntry, RequestRules, ResponseRules};
pub use selector::Selector;
pub use types::*;
