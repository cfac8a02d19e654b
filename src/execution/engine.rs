//! Container engine abstraction.
//!
//! The orchestrator only talks to the engine through [`SandboxEngine`], so
//! the Docker-backed client and in-memory test engines are interchangeable.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::io::AsyncWrite;

use crate::error::EngineError;
use crate::execution::demux::Frame;
use crate::execution::resources::ExecutionLimits;

/// Everything needed to create one sandbox instance.
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    /// Unique name for the instance.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Entrypoint, e.g. `["sh", "-c", "gcc ... && ./program"]`.
    pub cmd: Vec<String>,
    /// Working directory inside the sandbox.
    pub working_dir: String,
    /// Bind mounts in `host:container[:mode]` form.
    pub binds: Vec<String>,
    /// Resource ceilings.
    pub limits: ExecutionLimits,
    /// Network mode; engine default when `None`.
    pub network_mode: Option<String>,
}

/// Observed state of a sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Exited { exit_code: i64, oom_killed: bool },
    Removing,
    Dead,
    Unknown(String),
}

impl SandboxStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, SandboxStatus::Running | SandboxStatus::Restarting)
    }
}

impl std::fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxStatus::Created => write!(f, "created"),
            SandboxStatus::Running => write!(f, "running"),
            SandboxStatus::Paused => write!(f, "paused"),
            SandboxStatus::Restarting => write!(f, "restarting"),
            SandboxStatus::Exited {
                exit_code,
                oom_killed,
            } => {
                write!(f, "exited ({exit_code})")?;
                if *oom_killed {
                    write!(f, " oom-killed")?;
                }
                Ok(())
            }
            SandboxStatus::Removing => write!(f, "removing"),
            SandboxStatus::Dead => write!(f, "dead"),
            SandboxStatus::Unknown(s) => write!(f, "unknown: {s}"),
        }
    }
}

/// Duplex channel to a sandbox's standard streams.
pub struct AttachedChannel {
    /// Frames from standard output and standard error, in arrival order.
    pub output: BoxStream<'static, Result<Frame, EngineError>>,
    /// Standard input of the sandboxed process.
    pub input: Pin<Box<dyn AsyncWrite + Send>>,
}

impl std::fmt::Debug for AttachedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedChannel").finish_non_exhaustive()
    }
}

/// Operations the orchestrator needs from a container engine.
///
/// Per-sandbox calls are addressed by id, so one shared engine serves
/// concurrent jobs without locking.
#[async_trait]
pub trait SandboxEngine: Send + Sync {
    /// Liveness check of the engine's control socket.
    async fn ping(&self) -> Result<(), EngineError>;

    /// Creates (but does not start) a sandbox; returns its id.
    async fn create_sandbox(&self, spec: &SandboxSpec) -> Result<String, EngineError>;

    async fn start_sandbox(&self, id: &str) -> Result<(), EngineError>;

    /// Opens the combined stdout/stderr/stdin channel.
    async fn attach_sandbox(&self, id: &str) -> Result<AttachedChannel, EngineError>;

    /// Blocks until the sandbox is no longer running; returns the exit code.
    async fn wait_sandbox(&self, id: &str) -> Result<i64, EngineError>;

    async fn inspect_sandbox(&self, id: &str) -> Result<SandboxStatus, EngineError>;

    /// Recent combined log output, for diagnostics.
    async fn sandbox_logs(&self, id: &str) -> Result<String, EngineError>;

    /// Force-removes a sandbox whether or not it is still running.
    async fn remove_sandbox(&self, id: &str) -> Result<(), EngineError>;
}
