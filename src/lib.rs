//! code-runner: sandboxed execution of untrusted code snippets.
//!
//! This library accepts source code in one of several languages, runs it
//! inside a disposable resource-capped Docker container, and returns the
//! captured output. The HTTP service built on top of it lives in
//! [`server`].

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod languages;
pub mod metrics;
pub mod server;

// Re-export commonly used error types
pub use error::{ConfigError, EngineError, ExecutionError, WorkspaceError};
