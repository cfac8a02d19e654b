//! Service configuration.
//!
//! [`ServiceConfig`] is assembled from command-line arguments and
//! environment variables by the CLI, then validated once before the
//! service starts. It is never mutated afterwards.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::execution::connection::{DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY};
use crate::execution::orchestrator::{ExecutorSettings, DEFAULT_MAX_OUTPUT_BYTES};
use crate::execution::resources::ExecutionLimits;
use crate::execution::workspace::WorkspaceManager;
use crate::languages::LanguageRegistry;

/// Default HTTP bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Workspace root used when none is configured.
pub fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("code-runner")
}

/// Validated service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub workspace_root: PathBuf,
    /// Engine-side path of `workspace_root`, when it differs.
    pub host_workspace_root: Option<PathBuf>,
    /// Docker socket path; local defaults when `None`.
    pub docker_socket: Option<String>,
    pub connect_attempts: u32,
    pub connect_delay: Duration,
    pub limits: ExecutionLimits,
    pub network_mode: Option<String>,
    pub max_output_bytes: usize,
    pub pull_missing_images: bool,
    pub languages_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            workspace_root: default_workspace_root(),
            host_workspace_root: None,
            docker_socket: None,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_delay: DEFAULT_CONNECT_DELAY,
            limits: ExecutionLimits::default(),
            network_mode: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            pull_missing_images: true,
            languages_file: None,
        }
    }
}

impl ServiceConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_attempts == 0 {
            return Err(invalid("connect_attempts", "must be at least 1"));
        }
        if self.limits.memory_mb == 0 {
            return Err(invalid("memory_mb", "must be greater than 0"));
        }
        if !(self.limits.cpu_cores.is_finite() && self.limits.cpu_cores > 0.0) {
            return Err(invalid("cpu_cores", "must be a positive number"));
        }
        if self.limits.max_processes == Some(0) {
            return Err(invalid("pids_limit", "must be greater than 0"));
        }
        if self.workspace_root.as_os_str().is_empty() {
            return Err(invalid("workspace_root", "must not be empty"));
        }
        if self.max_output_bytes == 0 {
            return Err(invalid("max_output_bytes", "must be greater than 0"));
        }
        if self.host.trim().is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        Ok(())
    }

    /// Address the HTTP listener binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| invalid("host", format!("{e}")))
    }

    /// Built-in languages merged with the configured override file.
    pub fn language_registry(&self) -> Result<LanguageRegistry, ConfigError> {
        match &self.languages_file {
            Some(path) => LanguageRegistry::load(path),
            None => Ok(LanguageRegistry::builtin()),
        }
    }

    pub fn workspace_manager(&self) -> WorkspaceManager {
        let manager = WorkspaceManager::new(&self.workspace_root);
        match &self.host_workspace_root {
            Some(host_root) => manager.with_host_root(host_root),
            None => manager,
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            limits: self.limits.clone(),
            network_mode: self.network_mode.clone(),
            max_output_bytes: self.max_output_bytes,
            ..ExecutorSettings::default()
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
