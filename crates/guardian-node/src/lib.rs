//! # Guardian Node Library
//!
//! Configuration and runtime wiring behind the `guardiand` binary, exposed
//! for embedding and tests.

pub mod config;
pub mod runtime;

pub use config::{NodeConfig, NodeConfigError};
pub use runtime::NodeRuntime;
