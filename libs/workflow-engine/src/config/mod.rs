//! Workflow document configuration types.
//!
//! Provides structs for parsing and validating workflow definitions.

pub mod types;

pub use types::*;
