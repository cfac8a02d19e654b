//! Error types for code-runner operations.
//!
//! Defines error types for each subsystem:
//! - Container engine calls (connection, sandbox lifecycle, attach channel)
//! - Per-job workspace filesystem operations
//! - End-to-end job execution, one variant per failing phase
//! - Service configuration

use thiserror::Error;

/// Errors that can occur while talking to the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Container engine not available: {0}")]
    Unavailable(String),

    #[error("Image '{image}' could not be pulled: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Engine request failed: {0}")]
    Request(String),

    #[error("Sandbox '{id}' not found")]
    SandboxNotFound { id: String },

    #[error("Attached stream error: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while managing a job workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace '{path}': {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{file}' into workspace: {source}")]
    Write {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid workspace file name '{0}'")]
    InvalidFileName(String),
}

/// Errors that can occur while executing a job.
///
/// Every variant names the phase that failed; the message is what the
/// caller ultimately sees.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Language and code are required")]
    EmptyCode,

    #[error("Sandbox engine is not available")]
    EngineUnavailable(String),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Failed to create sandbox: {0}")]
    Create(#[source] EngineError),

    #[error("Failed to start sandbox: {0}")]
    Start(#[source] EngineError),

    #[error("Failed to attach to sandbox: {0}")]
    Attach(#[source] EngineError),

    #[error("Failed to write input to sandbox: {0}")]
    Input(#[source] std::io::Error),

    #[error("Execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Failed waiting for sandbox: {0}")]
    Wait(#[source] EngineError),

    #[error("Unexpected execution fault: {0}")]
    Fault(String),
}

impl ExecutionError {
    /// Whether the error was caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExecutionError::UnsupportedLanguage(_) | ExecutionError::EmptyCode
        )
    }

    /// Short label used for metrics and logs.
    pub fn phase(&self) -> &'static str {
        match self {
            ExecutionError::UnsupportedLanguage(_) | ExecutionError::EmptyCode => "validation",
            ExecutionError::EngineUnavailable(_) => "connect",
            ExecutionError::Workspace(_) => "workspace",
            ExecutionError::Create(_) => "create",
            ExecutionError::Start(_) => "start",
            ExecutionError::Attach(_) => "attach",
            ExecutionError::Input(_) => "input",
            ExecutionError::Timeout { .. } => "timeout",
            ExecutionError::Wait(_) => "wait",
            ExecutionError::Fault(_) => "fault",
        }
    }
}

/// Errors that can occur while loading service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid language definition for '{language}': {reason}")]
    InvalidLanguage { language: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(ExecutionError::UnsupportedLanguage("cobol".to_string()).is_client_error());
        assert!(ExecutionError::EmptyCode.is_client_error());
        assert!(!ExecutionError::Timeout { seconds: 15 }.is_client_error());
        assert!(!ExecutionError::EngineUnavailable("down".to_string()).is_client_error());
    }

    #[test]
    fn test_messages_are_caller_facing() {
        assert_eq!(
            ExecutionError::UnsupportedLanguage("cobol".to_string()).to_string(),
            "Unsupported language: cobol"
        );
        assert_eq!(
            ExecutionError::Timeout { seconds: 60 }.to_string(),
            "Execution timed out after 60 seconds"
        );
        assert_eq!(
            ExecutionError::EngineUnavailable("socket refused".to_string()).to_string(),
            "Sandbox engine is not available"
        );
    }

    #[test]
    fn test_phase_labels() {
        let err = ExecutionError::Start(EngineError::Request("boom".to_string()));
        assert_eq!(err.phase(), "start");
        assert_eq!(ExecutionError::Fault("panic".to_string()).phase(), "fault");
    }
}
