//! Shared utilities for the research workspace
//!
//! Logging setup and small helpers for reading configuration from the
//! environment.

pub mod env;
pub mod logging;

pub use logging::{init_tracing, init_tracing_json};
