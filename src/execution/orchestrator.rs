//! Execution orchestrator.
//!
//! Turns one [`ExecutionRequest`] into an isolated, time-bounded sandbox run:
//!
//! ```text
//! Created → WorkspaceReady → SandboxCreated → SandboxStarted → Attached
//!         → Draining → Terminated → Removed
//! ```
//!
//! Output draining starts as soon as the sandbox is attached and runs
//! alongside the input write and the wait for termination. Both of the
//! latter are bounded by the language deadline. The sandbox is removed and
//! the workspace deleted on every exit path; each job runs in its own task
//! so even a panic reaches cleanup.
//!
//! There is no bound on concurrent jobs and no queueing.

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::ExecutionError;
use crate::execution::connection::EngineContext;
use crate::execution::container::{JobPhase, Sandbox};
use crate::execution::demux::{self, CapturedOutput};
use crate::execution::engine::{AttachedChannel, SandboxEngine};
use crate::execution::job::{ExecutionOutcome, ExecutionRequest, Job};
use crate::execution::resources::ExecutionLimits;
use crate::execution::workspace::{WorkspaceManager, INPUT_FILE_NAME};
use crate::languages::{LanguageRegistry, LanguageSpec};
use crate::metrics::MetricsCollector;

/// Default cap on captured bytes per stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// How long the output channel may stay open after the sandbox exits.
const DEFAULT_OUTPUT_GRACE: Duration = Duration::from_secs(5);

/// Knobs applied to every job.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub limits: ExecutionLimits,
    pub network_mode: Option<String>,
    pub max_output_bytes: usize,
    pub output_grace: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            limits: ExecutionLimits::default(),
            network_mode: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            output_grace: DEFAULT_OUTPUT_GRACE,
        }
    }
}

/// Runs jobs against the shared engine connection.
pub struct Executor {
    context: Arc<EngineContext>,
    registry: Arc<LanguageRegistry>,
    workspaces: WorkspaceManager,
    settings: ExecutorSettings,
    metrics: MetricsCollector,
}

impl Executor {
    pub fn new(
        context: Arc<EngineContext>,
        registry: Arc<LanguageRegistry>,
        workspaces: WorkspaceManager,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            context,
            registry,
            workspaces,
            settings,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Checks a request without allocating anything.
    pub fn validate(&self, request: &ExecutionRequest) -> Result<Arc<LanguageSpec>, ExecutionError> {
        if request.language.trim().is_empty() || request.code.is_empty() {
            return Err(ExecutionError::EmptyCode);
        }
        self.registry
            .lookup(&request.language)
            .ok_or_else(|| ExecutionError::UnsupportedLanguage(request.language.clone()))
    }

    /// Runs one job to completion.
    ///
    /// Returns the outcome for any program that terminated, whatever its
    /// exit code, or the error of the phase that failed. Resources are
    /// released before this returns.
    pub async fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let language = self.validate(&request)?;
        let engine = self.context.engine().await?;

        let job = Job::new(language);
        let language_id = job.language.id.clone();
        let span = info_span!("job", job_id = %job.id, language = %language_id);
        let started = Instant::now();

        self.metrics.job_started();
        let handle = tokio::spawn(
            run_job(
                job,
                request,
                engine,
                self.workspaces.clone(),
                self.settings.clone(),
            )
            .instrument(span),
        );

        let result = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ExecutionError::Fault("job task panicked".to_string())),
            Err(e) => Err(ExecutionError::Fault(e.to_string())),
        };
        self.metrics.job_finished();

        let outcome_label = match &result {
            Ok(outcome) if outcome.succeeded() => "success",
            Ok(_) => "nonzero_exit",
            Err(e) => e.phase(),
        };
        self.metrics
            .record_execution(&language_id, outcome_label, started.elapsed().as_secs_f64());

        result
    }
}

async fn run_job(
    mut job: Job,
    request: ExecutionRequest,
    engine: Arc<dyn SandboxEngine>,
    workspaces: WorkspaceManager,
    settings: ExecutorSettings,
) -> Result<ExecutionOutcome, ExecutionError> {
    let started = Instant::now();

    let workspace = workspaces.create(&job.id)?;
    workspace.write(&job.language.source_file, &request.code)?;
    let input = request.input.as_deref().filter(|text| !text.is_empty());
    if let Some(text) = input {
        workspace.write(INPUT_FILE_NAME, text)?;
    }
    job.advance(JobPhase::WorkspaceReady);

    let spec = job.sandbox_spec(
        workspace.host_path(),
        &settings.limits,
        settings.network_mode.as_deref(),
    );
    let sandbox = Sandbox::create(engine, &spec)
        .await
        .map_err(ExecutionError::Create)?;
    job.advance(JobPhase::SandboxCreated);

    let result = drive(&mut job, &sandbox, input, &settings).await;

    sandbox.remove().await;
    job.advance(JobPhase::Removed);
    workspace.destroy();

    let (captured, exit_code) = result?;
    if captured.is_truncated() {
        warn!(
            limit = settings.max_output_bytes,
            "Output exceeded the capture limit and was truncated"
        );
    }

    let outcome = ExecutionOutcome {
        job_id: job.id,
        language: job.language.id.clone(),
        stdout: captured.stdout_text(),
        stderr: captured.stderr_text(),
        exit_code,
        duration: started.elapsed(),
        truncated: captured.is_truncated(),
    };

    info!(
        exit_code,
        duration_ms = outcome.duration.as_millis() as u64,
        "Job finished"
    );
    Ok(outcome)
}

/// Start and attach, then drain output while feeding input and waiting
/// for exit under the language deadline.
async fn drive(
    job: &mut Job,
    sandbox: &Sandbox,
    input: Option<&str>,
    settings: &ExecutorSettings,
) -> Result<(CapturedOutput, i64), ExecutionError> {
    sandbox.start().await.map_err(ExecutionError::Start)?;
    job.advance(JobPhase::SandboxStarted);

    let AttachedChannel {
        output,
        input: stdin,
    } = sandbox.attach().await.map_err(ExecutionError::Attach)?;
    job.advance(JobPhase::Attached);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut drainer = tokio::spawn(demux::drain(
        output.take_until(stop_rx),
        settings.max_output_bytes,
    ));
    job.advance(JobPhase::Draining);

    let deadline = job.language.timeout();
    let waited = tokio::time::timeout(deadline, feed_and_wait(sandbox, stdin, input)).await;
    job.advance(JobPhase::Terminated);

    match waited {
        Ok(Ok(exit_code)) => {
            let joined = match tokio::time::timeout(settings.output_grace, &mut drainer).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Output channel still open after exit, closing it");
                    let _ = stop_tx.send(());
                    drainer.await
                }
            };
            let captured = joined
                .map_err(|e| ExecutionError::Fault(format!("output drain failed: {e}")))?;

            debug!(
                exit_code,
                stdout_bytes = captured.stdout().len(),
                stderr_bytes = captured.stderr().len(),
                "Output captured"
            );
            Ok((captured, exit_code))
        }
        Ok(Err(e)) => {
            let _ = stop_tx.send(());
            let _ = drainer.await;
            Err(e)
        }
        Err(_) => {
            let _ = stop_tx.send(());
            let partial = drainer.await.unwrap_or_default();
            warn!(
                deadline_secs = deadline.as_secs(),
                stdout_bytes = partial.stdout().len(),
                stderr_bytes = partial.stderr().len(),
                "Sandbox exceeded its deadline"
            );
            sandbox.log_diagnostics("deadline exceeded").await;
            Err(ExecutionError::Timeout {
                seconds: deadline.as_secs(),
            })
        }
    }
}

/// Writes input while waiting for the sandbox to exit.
///
/// A program may exit without reading all of its input; once the exit is
/// seen the pending write is dropped.
async fn feed_and_wait(
    sandbox: &Sandbox,
    stdin: Pin<Box<dyn AsyncWrite + Send>>,
    input: Option<&str>,
) -> Result<i64, ExecutionError> {
    let wait = sandbox.wait();
    tokio::pin!(wait);

    tokio::select! {
        fed = feed_input(stdin, input) => {
            fed?;
            wait.await.map_err(ExecutionError::Wait)
        }
        exited = &mut wait => exited.map_err(ExecutionError::Wait),
    }
}

async fn feed_input(
    mut stdin: Pin<Box<dyn AsyncWrite + Send>>,
    input: Option<&str>,
) -> Result<(), ExecutionError> {
    if let Some(text) = input {
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(ExecutionError::Input)?;
        stdin.flush().await.map_err(ExecutionError::Input)?;
    }
    // Programs reading stdin must see end-of-file.
    if let Err(e) = stdin.shutdown().await {
        debug!(error = %e, "Closing sandbox stdin failed");
    }
    Ok(())
}
