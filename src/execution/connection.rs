//! Container engine connection management.
//!
//! The service probes the engine once at startup: a bounded number of
//! connect-and-ping attempts with a fixed delay between them. The outcome
//! is recorded in a process-wide [`EngineContext`] that every job consults
//! before touching the engine. There is no reconnect loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::{EngineError, ExecutionError};
use crate::execution::engine::SandboxEngine;

/// Default number of connection attempts.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

/// Default fixed delay between attempts.
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_secs(2);

/// Reachability of the container engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    PermanentlyFailed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::PermanentlyFailed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of [`connect_with_retry`].
pub enum ConnectionResult {
    Connected {
        engine: Arc<dyn SandboxEngine>,
        attempts: u32,
    },
    Failed {
        attempts: u32,
        last_error: String,
    },
}

impl std::fmt::Debug for ConnectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionResult::Connected { attempts, .. } => f
                .debug_struct("Connected")
                .field("attempts", attempts)
                .finish_non_exhaustive(),
            ConnectionResult::Failed {
                attempts,
                last_error,
            } => f
                .debug_struct("Failed")
                .field("attempts", attempts)
                .field("last_error", last_error)
                .finish(),
        }
    }
}

/// Connects and pings the engine, retrying up to `max_attempts` times.
///
/// Waits `delay` between attempts (no backoff). Logs one line per attempt.
pub async fn connect_with_retry<F, Fut>(
    mut connect: F,
    max_attempts: u32,
    delay: Duration,
) -> ConnectionResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Arc<dyn SandboxEngine>, EngineError>>,
{
    let mut last_error = String::from("no connection attempt made");

    for attempt in 1..=max_attempts {
        let outcome = match connect().await {
            Ok(engine) => engine.ping().await.map(|()| engine),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(engine) => {
                info!(attempt, max_attempts, "Connected to sandbox engine");
                return ConnectionResult::Connected {
                    engine,
                    attempts: attempt,
                };
            }
            Err(e) => {
                warn!(attempt, max_attempts, error = %e, "Sandbox engine connection attempt failed");
                last_error = e.to_string();
                if attempt < max_attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    ConnectionResult::Failed {
        attempts: max_attempts,
        last_error,
    }
}

enum Slot {
    Disconnected,
    Connecting,
    Connected(Arc<dyn SandboxEngine>),
    Failed(String),
}

/// Process-wide view of the engine connection.
///
/// Created once at startup and shared by every request.
pub struct EngineContext {
    slot: RwLock<Slot>,
}

impl EngineContext {
    /// A context that has not attempted to connect yet.
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot::Disconnected),
        }
    }

    /// A context that is already connected to `engine`.
    pub fn connected(engine: Arc<dyn SandboxEngine>) -> Self {
        Self {
            slot: RwLock::new(Slot::Connected(engine)),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        match &*self.slot.read().await {
            Slot::Disconnected => ConnectionState::Disconnected,
            Slot::Connecting => ConnectionState::Connecting,
            Slot::Connected(_) => ConnectionState::Connected,
            Slot::Failed(_) => ConnectionState::PermanentlyFailed,
        }
    }

    /// The connected engine, or `EngineUnavailable` in any other state.
    pub async fn engine(&self) -> Result<Arc<dyn SandboxEngine>, ExecutionError> {
        match &*self.slot.read().await {
            Slot::Connected(engine) => Ok(Arc::clone(engine)),
            Slot::Disconnected => Err(ExecutionError::EngineUnavailable(
                "not connected".to_string(),
            )),
            Slot::Connecting => Err(ExecutionError::EngineUnavailable(
                "connection in progress".to_string(),
            )),
            Slot::Failed(reason) => Err(ExecutionError::EngineUnavailable(reason.clone())),
        }
    }

    /// Runs the startup probe and records its outcome.
    pub async fn establish<F, Fut>(
        &self,
        connect: F,
        max_attempts: u32,
        delay: Duration,
    ) -> ConnectionState
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Arc<dyn SandboxEngine>, EngineError>>,
    {
        *self.slot.write().await = Slot::Connecting;

        let next = match connect_with_retry(connect, max_attempts, delay).await {
            ConnectionResult::Connected { engine, .. } => Slot::Connected(engine),
            ConnectionResult::Failed {
                attempts,
                last_error,
            } => {
                error!(
                    attempts,
                    error = %last_error,
                    "Sandbox engine unreachable, execution requests will be rejected"
                );
                Slot::Failed(last_error)
            }
        };

        *self.slot.write().await = next;
        self.state().await
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}
