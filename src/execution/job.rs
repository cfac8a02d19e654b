//! Job model: request, in-flight job, and outcome.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::execution::container::JobPhase;
use crate::execution::engine::SandboxSpec;
use crate::execution::resources::ExecutionLimits;
use crate::languages::LanguageSpec;

/// Working directory inside every sandbox; the workspace is mounted here.
pub const SANDBOX_WORKDIR: &str = "/code";

/// Prefix of sandbox instance names.
const SANDBOX_NAME_PREFIX: &str = "code-runner-";

/// One request to compile and run a code snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
    pub input: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            input: None,
        }
    }

    /// Sets the text fed to the program's standard input.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// Result of a job that ran to termination.
///
/// A non-zero `exit_code` is still an outcome; whether it counts as a
/// failure is decided by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub job_id: Uuid,
    pub language: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Output was cut at the configured size limit.
    pub truncated: bool,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// An in-flight job.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub language: Arc<LanguageSpec>,
    phase: JobPhase,
    created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(language: Arc<LanguageSpec>) -> Self {
        Self {
            id: Uuid::new_v4(),
            language,
            phase: JobPhase::Created,
            created_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Moves the job to `phase`.
    pub fn advance(&mut self, phase: JobPhase) {
        debug!(job_id = %self.id, from = %self.phase, to = %phase, "Job phase");
        self.phase = phase;
    }

    /// Engine-side name of this job's sandbox.
    pub fn sandbox_name(&self) -> String {
        format!("{}{}", SANDBOX_NAME_PREFIX, self.id)
    }

    /// Sandbox definition: the language image running the composed command
    /// in the bind-mounted workspace.
    pub fn sandbox_spec(
        &self,
        workspace_host_path: &Path,
        limits: &ExecutionLimits,
        network_mode: Option<&str>,
    ) -> SandboxSpec {
        SandboxSpec {
            name: self.sandbox_name(),
            image: self.language.image.clone(),
            cmd: vec![
                "sh".to_string(),
                "-c".to_string(),
                self.language.command_line(),
            ],
            working_dir: SANDBOX_WORKDIR.to_string(),
            binds: vec![format!(
                "{}:{}:rw",
                workspace_host_path.display(),
                SANDBOX_WORKDIR
            )],
            limits: limits.clone(),
            network_mode: network_mode.map(str::to_string),
        }
    }
}
