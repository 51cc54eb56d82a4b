//! Ambient stack shared by the other `loom-*` crates: tracing/logging
//! initialization today, a home for cross-cutting error-conversion
//! helpers as they're needed.

pub mod telemetry;

pub use telemetry::init_tracing;
