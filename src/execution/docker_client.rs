//! Docker engine client using the bollard crate.
//!
//! Implements [`SandboxEngine`] against the Docker Engine API over the
//! local control socket.

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    InspectContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::execution::demux::Frame;
use crate::execution::engine::{AttachedChannel, SandboxEngine, SandboxSpec, SandboxStatus};

/// Seconds bollard waits on a single API request.
const REQUEST_TIMEOUT_SECONDS: u64 = 120;

/// Lines of log output fetched for diagnostics.
const DIAGNOSTIC_LOG_LINES: &str = "50";

/// Docker client wrapper implementing [`SandboxEngine`].
pub struct DockerEngine {
    docker: Docker,
    pull_missing_images: bool,
}

impl DockerEngine {
    /// Connects to the Docker daemon.
    ///
    /// Uses `socket` when given, otherwise the local defaults (`DOCKER_HOST`
    /// or the platform's default socket). Connecting does not talk to the
    /// daemon; call [`SandboxEngine::ping`] to check liveness.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the client cannot be built.
    pub fn connect(socket: Option<&str>) -> Result<Self, EngineError> {
        let docker = match socket {
            Some(path) => Docker::connect_with_socket(
                path,
                REQUEST_TIMEOUT_SECONDS,
                bollard::API_DEFAULT_VERSION,
            ),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| EngineError::Unavailable(format!("Failed to connect: {e}")))?;

        Ok(Self::from_docker(docker))
    }

    /// Creates a client from an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self {
            docker,
            pull_missing_images: true,
        }
    }

    /// Whether to pull images that are not present locally before creation.
    pub fn with_image_pull(mut self, enabled: bool) -> Self {
        self.pull_missing_images = enabled;
        self
    }

    async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        info!(image = image, "Pulling sandbox image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| EngineError::ImagePull {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    fn not_found_or(id: &str, e: BollardError, context: &str) -> EngineError {
        match e {
            BollardError::DockerResponseServerError {
                status_code: 404, ..
            } => EngineError::SandboxNotFound { id: id.to_string() },
            other => EngineError::Request(format!("{context}: {other}")),
        }
    }
}

/// Builds the bollard create-container body for a sandbox.
///
/// TTY stays off so the engine multiplexes stdout and stderr, stdin is
/// held open for a single attach, and auto-removal is off because the
/// orchestrator removes the sandbox itself after capturing output.
fn container_config(spec: &SandboxSpec) -> Config<String> {
    let host_config = HostConfig {
        memory: Some(spec.limits.memory_bytes()),
        cpu_period: Some(spec.limits.cpu_period()),
        cpu_quota: Some(spec.limits.cpu_quota()),
        pids_limit: spec.limits.max_processes.map(|max| max as i64),
        network_mode: spec.network_mode.clone(),
        binds: if spec.binds.is_empty() {
            None
        } else {
            Some(spec.binds.clone())
        },
        auto_remove: Some(false),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: Some(spec.cmd.clone()),
        working_dir: Some(spec.working_dir.clone()),
        host_config: Some(host_config),
        tty: Some(false),
        open_stdin: Some(true),
        stdin_once: Some(true),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        ..Default::default()
    }
}

#[async_trait]
impl SandboxEngine for DockerEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map_err(|e| EngineError::Unavailable(format!("Ping failed: {e}")))?;
        Ok(())
    }

    async fn create_sandbox(&self, spec: &SandboxSpec) -> Result<String, EngineError> {
        if self.pull_missing_images && !self.image_exists(&spec.image).await {
            self.pull_image(&spec.image).await?;
        }

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(|e| EngineError::Request(format!("Failed to create container: {e}")))?;

        for warning in &response.warnings {
            debug!(sandbox_id = %response.id, warning = %warning, "Container create warning");
        }

        Ok(response.id)
    }

    async fn start_sandbox(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Self::not_found_or(id, e, "Failed to start container"))
    }

    async fn attach_sandbox(&self, id: &str) -> Result<AttachedChannel, EngineError> {
        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            // Replays output produced between start and attach.
            logs: Some(true),
            detach_keys: None,
        };

        let AttachContainerResults { output, input } = self
            .docker
            .attach_container(id, Some(options))
            .await
            .map_err(|e| Self::not_found_or(id, e, "Failed to attach to container"))?;

        let output = output
            .filter_map(|chunk| async move {
                match chunk {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        Some(Ok(Frame::stdout(message.to_vec())))
                    }
                    Ok(LogOutput::StdErr { message }) => Some(Ok(Frame::stderr(message.to_vec()))),
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(EngineError::Stream(e.to_string()))),
                }
            })
            .boxed();

        Ok(AttachedChannel { output, input })
    }

    async fn wait_sandbox(&self, id: &str) -> Result<i64, EngineError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Self::not_found_or(id, e, "Error waiting for container")),
            None => match self.inspect_sandbox(id).await? {
                SandboxStatus::Exited { exit_code, .. } => Ok(exit_code),
                other => Err(EngineError::Request(format!(
                    "Container did not exit normally (state: {other})"
                ))),
            },
        }
    }

    async fn inspect_sandbox(&self, id: &str) -> Result<SandboxStatus, EngineError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| Self::not_found_or(id, e, "Failed to inspect container"))?;

        let state = info
            .state
            .ok_or_else(|| EngineError::Request("Container has no state".to_string()))?;

        let status = state.status.map(|s| s.to_string()).unwrap_or_default();

        Ok(match status.as_str() {
            "created" => SandboxStatus::Created,
            "running" => SandboxStatus::Running,
            "paused" => SandboxStatus::Paused,
            "restarting" => SandboxStatus::Restarting,
            "removing" => SandboxStatus::Removing,
            "exited" => SandboxStatus::Exited {
                exit_code: state.exit_code.unwrap_or(-1),
                oom_killed: state.oom_killed.unwrap_or(false),
            },
            "dead" => SandboxStatus::Dead,
            other => SandboxStatus::Unknown(other.to_string()),
        })
    }

    async fn sandbox_logs(&self, id: &str) -> Result<String, EngineError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            tail: DIAGNOSTIC_LOG_LINES.to_string(),
            ..Default::default()
        };

        let mut logs = self.docker.logs(id, Some(options));
        let mut output = String::new();

        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdIn { .. }) => {}
                Err(e) => {
                    return Err(Self::not_found_or(id, e, "Error reading logs"));
                }
            }
        }

        Ok(output)
    }

    async fn remove_sandbox(&self, id: &str) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| Self::not_found_or(id, e, "Failed to remove container"))
    }
}
