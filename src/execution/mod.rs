//! Sandboxed execution layer.
//!
//! Runs one code submission per job inside a disposable, resource-capped
//! container, using the bollard crate to talk to the Docker engine.
//!
//! # Architecture
//!
//! ```text
//! EngineContext ──► Executor::execute
//!                     ├─ WorkspaceManager::create ──► Workspace (dropped → deleted)
//!                     ├─ Sandbox::create / start / attach
//!                     ├─ demux::drain  ║  Sandbox::wait (deadline)
//!                     └─ Sandbox::remove
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use code_runner::execution::{
//!     EngineContext, ExecutionRequest, Executor, ExecutorSettings, WorkspaceManager,
//! };
//! use code_runner::languages::LanguageRegistry;
//!
//! let executor = Executor::new(
//!     Arc::new(EngineContext::connected(engine)),
//!     Arc::new(LanguageRegistry::builtin()),
//!     WorkspaceManager::new("/tmp/code-runner"),
//!     ExecutorSettings::default(),
//! );
//! let outcome = executor
//!     .execute(ExecutionRequest::new("python", "print('hello')"))
//!     .await?;
//! assert_eq!(outcome.stdout, "hello\n");
//! ```

pub mod connection;
pub mod container;
pub mod demux;
pub mod docker_client;
pub mod engine;
pub mod job;
pub mod orchestrator;
pub mod resources;
pub mod workspace;

pub use connection::{connect_with_retry, ConnectionResult, ConnectionState, EngineContext};
pub use container::{JobPhase, Sandbox};
pub use demux::{CapturedOutput, Frame, StreamKind};
pub use docker_client::DockerEngine;
pub use engine::{AttachedChannel, SandboxEngine, SandboxSpec, SandboxStatus};
pub use job::{ExecutionOutcome, ExecutionRequest, Job};
pub use orchestrator::{Executor, ExecutorSettings};
pub use resources::ExecutionLimits;
pub use workspace::{Workspace, WorkspaceManager};
