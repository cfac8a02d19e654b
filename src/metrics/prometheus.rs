//! Prometheus metrics registration and export.
//!
//! Defines the Prometheus metrics used by code-runner and provides
//! functions for initializing, registering, and exporting them.

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::{Mutex, OnceLock};

/// Global Prometheus registry for all code-runner metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total executions, labeled by language and outcome.
pub static EXECUTIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Execution duration in seconds, labeled by language.
pub static EXECUTION_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of jobs currently executing.
pub static JOBS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Calling again is harmless: the first registry
/// stays in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let executions_total = CounterVec::new(
        Opts::new("code_runner_executions_total", "Total number of executions"),
        &["language", "outcome"],
    )?;

    let execution_duration = HistogramVec::new(
        HistogramOpts::new(
            "code_runner_execution_duration_seconds",
            "Execution wall-clock duration in seconds",
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 15.0, 30.0, 60.0]),
        &["language"],
    )?;

    let jobs_in_progress = Gauge::new(
        "code_runner_jobs_in_progress",
        "Number of jobs currently executing",
    )?;

    registry.register(Box::new(executions_total.clone()))?;
    registry.register(Box::new(execution_duration.clone()))?;
    registry.register(Box::new(jobs_in_progress.clone()))?;

    let _ = EXECUTIONS_TOTAL.set(executions_total);
    let _ = EXECUTION_DURATION.set(execution_duration);
    let _ = JOBS_IN_PROGRESS.set(jobs_in_progress);
    let _ = REGISTRY.set(registry);

    tracing::info!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// HTTP handler for the /metrics endpoint.
pub async fn metrics_handler() -> String {
    export_metrics()
}
