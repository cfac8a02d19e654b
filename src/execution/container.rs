//! Sandbox lifecycle handle.
//!
//! A [`Sandbox`] owns one engine-side instance from creation until it is
//! removed. Removal is explicit on every normal path; if the handle is
//! dropped while still owning an instance (panic, task cancellation), the
//! drop schedules a forced removal on the runtime.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::execution::engine::{AttachedChannel, SandboxEngine, SandboxSpec, SandboxStatus};

/// Phase of a job's lifecycle. Phases advance strictly in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPhase {
    Created,
    WorkspaceReady,
    SandboxCreated,
    SandboxStarted,
    Attached,
    Draining,
    Terminated,
    Removed,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobPhase::Created => "created",
            JobPhase::WorkspaceReady => "workspace-ready",
            JobPhase::SandboxCreated => "sandbox-created",
            JobPhase::SandboxStarted => "sandbox-started",
            JobPhase::Attached => "attached",
            JobPhase::Draining => "draining",
            JobPhase::Terminated => "terminated",
            JobPhase::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// An engine-side sandbox instance owned by one job.
pub struct Sandbox {
    id: String,
    engine: Arc<dyn SandboxEngine>,
    created_at: DateTime<Utc>,
    removed: bool,
}

impl Sandbox {
    /// Creates the instance. It is not started.
    pub async fn create(
        engine: Arc<dyn SandboxEngine>,
        spec: &SandboxSpec,
    ) -> Result<Self, EngineError> {
        let id = engine.create_sandbox(spec).await?;
        debug!(sandbox_id = %id, image = %spec.image, "Sandbox created");

        Ok(Self {
            id,
            engine,
            created_at: Utc::now(),
            removed: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn start(&self) -> Result<(), EngineError> {
        self.engine.start_sandbox(&self.id).await
    }

    pub async fn attach(&self) -> Result<AttachedChannel, EngineError> {
        self.engine.attach_sandbox(&self.id).await
    }

    /// Waits for the sandbox to stop running; returns the exit code.
    pub async fn wait(&self) -> Result<i64, EngineError> {
        self.engine.wait_sandbox(&self.id).await
    }

    /// Logs the current state and recent output of the sandbox.
    ///
    /// Operator diagnostics only; failures are logged and ignored.
    pub async fn log_diagnostics(&self, reason: &str) {
        let state = match self.engine.inspect_sandbox(&self.id).await {
            Ok(status) => status.to_string(),
            Err(e) => format!("inspect failed: {e}"),
        };
        let logs = match self.engine.sandbox_logs(&self.id).await {
            Ok(logs) => logs,
            Err(e) => format!("logs unavailable: {e}"),
        };

        warn!(
            sandbox_id = %self.id,
            reason = reason,
            state = %state,
            logs = %logs,
            "Sandbox diagnostics"
        );
    }

    pub async fn status(&self) -> Result<SandboxStatus, EngineError> {
        self.engine.inspect_sandbox(&self.id).await
    }

    /// Force-removes the instance.
    ///
    /// Failures are logged, never returned, so they cannot replace the
    /// job's own result.
    pub async fn remove(mut self) {
        let result = self.engine.remove_sandbox(&self.id).await;
        self.removed = true;
        match result {
            Ok(()) => debug!(sandbox_id = %self.id, "Sandbox removed"),
            Err(e) => warn!(sandbox_id = %self.id, error = %e, "Failed to remove sandbox"),
        }
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("removed", &self.removed)
            .finish()
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        warn!(sandbox_id = %self.id, "Sandbox dropped without removal, scheduling removal");
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(sandbox_id = %self.id, "No runtime available, sandbox leaked");
            return;
        };

        let engine = Arc::clone(&self.engine);
        let id = std::mem::take(&mut self.id);
        runtime.spawn(async move {
            if let Err(e) = engine.remove_sandbox(&id).await {
                warn!(sandbox_id = %id, error = %e, "Deferred sandbox removal failed");
            }
        });
    }
}
