//! CLI command definitions for code-runner.
//!
//! `serve` runs the HTTP service; `languages` prints the effective
//! language table.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::config::{ServiceConfig, DEFAULT_HOST, DEFAULT_PORT};
use crate::error::EngineError;
use crate::execution::connection::{DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY};
use crate::execution::orchestrator::DEFAULT_MAX_OUTPUT_BYTES;
use crate::execution::{DockerEngine, EngineContext, ExecutionLimits, Executor, SandboxEngine};
use crate::languages::LanguageRegistry;
use crate::metrics::init_metrics;
use crate::server::{self, AppState};

/// Sandboxed code execution service.
#[derive(Parser)]
#[command(name = "code-runner")]
#[command(about = "Compile and run untrusted code snippets in disposable containers")]
#[command(version)]
#[command(
    long_about = "code-runner accepts source code over HTTP, runs it in a resource-capped Docker container, and returns its output.\n\nExample usage:\n  code-runner serve --port 8080\n  code-runner languages --json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the HTTP execution service.
    Serve(ServeArgs),

    /// Print the supported languages.
    #[command(alias = "langs")]
    Languages(LanguagesArgs),
}

/// Arguments for `code-runner serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "CODE_RUNNER_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory under which per-job workspaces are created.
    #[arg(long, env = "CODE_RUNNER_WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    /// Path of the workspace root as seen by the Docker host, when this
    /// service itself runs in a container.
    #[arg(long, env = "CODE_RUNNER_HOST_WORKSPACE_ROOT")]
    pub host_workspace_root: Option<PathBuf>,

    /// Docker socket path (defaults to DOCKER_HOST or the platform socket).
    #[arg(long, env = "DOCKER_SOCKET")]
    pub docker_socket: Option<String>,

    /// Connection attempts at startup.
    #[arg(long, env = "CODE_RUNNER_CONNECT_ATTEMPTS", default_value_t = DEFAULT_CONNECT_ATTEMPTS)]
    pub connect_attempts: u32,

    /// Seconds between connection attempts.
    #[arg(long, env = "CODE_RUNNER_CONNECT_DELAY", default_value_t = DEFAULT_CONNECT_DELAY.as_secs())]
    pub connect_delay: u64,

    /// Memory limit per sandbox in MiB.
    #[arg(long, env = "CODE_RUNNER_MEMORY_MB", default_value = "1536")]
    pub memory_mb: u64,

    /// CPU limit per sandbox in cores.
    #[arg(long, env = "CODE_RUNNER_CPUS", default_value = "1.5")]
    pub cpus: f64,

    /// Maximum processes per sandbox.
    #[arg(long, env = "CODE_RUNNER_PIDS_LIMIT")]
    pub pids_limit: Option<u64>,

    /// Docker network mode for sandboxes (e.g. "none").
    #[arg(long, env = "CODE_RUNNER_NETWORK_MODE")]
    pub network_mode: Option<String>,

    /// Maximum captured bytes per output stream.
    #[arg(long, env = "CODE_RUNNER_MAX_OUTPUT_BYTES", default_value_t = DEFAULT_MAX_OUTPUT_BYTES)]
    pub max_output_bytes: usize,

    /// Pull sandbox images that are missing locally.
    #[arg(
        long,
        env = "CODE_RUNNER_PULL_IMAGES",
        default_value = "true",
        action = clap::ArgAction::Set
    )]
    pub pull_images: bool,

    /// YAML file with language overrides.
    #[arg(long, env = "CODE_RUNNER_LANGUAGES")]
    pub languages: Option<PathBuf>,
}

impl ServeArgs {
    /// Converts the arguments into a validated configuration.
    pub fn into_config(self) -> anyhow::Result<ServiceConfig> {
        let mut limits = ExecutionLimits::new(self.memory_mb, self.cpus);
        if let Some(max) = self.pids_limit {
            limits = limits.with_max_processes(max);
        }

        let defaults = ServiceConfig::default();
        let config = ServiceConfig {
            host: self.host,
            port: self.port,
            workspace_root: self.workspace_root.unwrap_or(defaults.workspace_root),
            host_workspace_root: self.host_workspace_root,
            docker_socket: self.docker_socket,
            connect_attempts: self.connect_attempts,
            connect_delay: Duration::from_secs(self.connect_delay),
            limits,
            network_mode: self.network_mode,
            max_output_bytes: self.max_output_bytes,
            pull_missing_images: self.pull_images,
            languages_file: self.languages,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Arguments for `code-runner languages`.
#[derive(Parser, Debug)]
pub struct LanguagesArgs {
    /// YAML file with language overrides.
    #[arg(long, env = "CODE_RUNNER_LANGUAGES")]
    pub languages: Option<PathBuf>,

    /// Output JSON instead of a table.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows the caller to access global options like log_level
/// before running the command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve_command(args).await?,
        Commands::Languages(args) => run_languages_command(args)?,
    }
    Ok(())
}

// ============================================================================
// serve
// ============================================================================

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.into_config()?;
    init_metrics().context("Failed to initialize metrics")?;

    let registry = config
        .language_registry()
        .context("Failed to load language definitions")?;
    info!(
        languages = registry.len(),
        workspace_root = %config.workspace_root.display(),
        memory_mb = config.limits.memory_mb,
        cpus = config.limits.cpu_cores,
        "Starting code-runner"
    );

    let context = Arc::new(EngineContext::new());
    let executor = Arc::new(Executor::new(
        Arc::clone(&context),
        Arc::new(registry),
        config.workspace_manager(),
        config.executor_settings(),
    ));

    // The listener comes up while the engine is probed; requests arriving
    // before the probe finishes are rejected as engine-unavailable.
    let probe_context = Arc::clone(&context);
    let socket = config.docker_socket.clone();
    let pull = config.pull_missing_images;
    let (attempts, delay) = (config.connect_attempts, config.connect_delay);
    tokio::spawn(async move {
        probe_context
            .establish(
                || {
                    let socket = socket.clone();
                    async move {
                        let engine = DockerEngine::connect(socket.as_deref())?.with_image_pull(pull);
                        Ok::<Arc<dyn SandboxEngine>, EngineError>(Arc::new(engine))
                    }
                },
                attempts,
                delay,
            )
            .await;
    });

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, server::router(AppState::new(executor)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining in-flight requests");
}

// ============================================================================
// languages
// ============================================================================

#[derive(Debug, Serialize)]
struct LanguageRow<'a> {
    id: &'a str,
    image: &'a str,
    source_file: &'a str,
    command: String,
    timeout_seconds: u64,
}

fn run_languages_command(args: LanguagesArgs) -> anyhow::Result<()> {
    let registry = match &args.languages {
        Some(path) => LanguageRegistry::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => LanguageRegistry::builtin(),
    };

    let rows: Vec<LanguageRow<'_>> = registry
        .specs()
        .map(|spec| LanguageRow {
            id: &spec.id,
            image: &spec.image,
            source_file: &spec.source_file,
            command: spec.command_line(),
            timeout_seconds: spec.timeout_seconds,
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<12} {:<40} {:<14} {:>8}", "LANGUAGE", "IMAGE", "SOURCE", "TIMEOUT");
    for row in &rows {
        println!(
            "{:<12} {:<40} {:<14} {:>7}s",
            row.id, row.image, row.source_file, row.timeout_seconds
        );
    }
    println!("\n{} languages", rows.len());
    Ok(())
}
