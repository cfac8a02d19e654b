//! Recording helpers for code-runner metrics.
//!
//! Every method is a no-op until `init_metrics()` has run, so library users
//! and tests can execute jobs without a registry.

use super::prometheus::{EXECUTIONS_TOTAL, EXECUTION_DURATION, JOBS_IN_PROGRESS};

/// Metrics collector for execution metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished execution.
    ///
    /// # Arguments
    ///
    /// * `language` - Language identifier of the job
    /// * `outcome` - "success", "nonzero_exit", or the failing phase
    /// * `duration_secs` - Wall-clock duration in seconds
    pub fn record_execution(&self, language: &str, outcome: &str, duration_secs: f64) {
        if let Some(total) = EXECUTIONS_TOTAL.get() {
            total.with_label_values(&[language, outcome]).inc();
        }

        if let Some(duration) = EXECUTION_DURATION.get() {
            duration
                .with_label_values(&[language])
                .observe(duration_secs);
        }

        tracing::trace!(
            language = language,
            outcome = outcome,
            duration_secs = duration_secs,
            "Recorded execution metric"
        );
    }

    /// Mark a job as started.
    pub fn job_started(&self) {
        if let Some(gauge) = JOBS_IN_PROGRESS.get() {
            gauge.inc();
        }
    }

    /// Mark a job as finished.
    pub fn job_finished(&self) {
        if let Some(gauge) = JOBS_IN_PROGRESS.get() {
            gauge.dec();
        }
    }
}
