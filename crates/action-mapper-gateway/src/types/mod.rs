//! Gateway data types.

pub mod error;

pub use error::*;
