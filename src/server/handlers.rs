//! Request handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

use super::AppState;
use crate::error::ExecutionError;
use crate::execution::{ConnectionState, ExecutionOutcome, ExecutionRequest};

/// Body of `POST /api/execute`.
///
/// Fields are optional here so that a missing field is reported as a
/// validation error rather than a malformed body.
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
}

/// Body of a successful `POST /api/execute`.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub output: String,
    pub error: String,
}

/// Error reply: a status and a single message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        if err.is_client_error() {
            return ApiError::bad_request(err.to_string());
        }

        match &err {
            ExecutionError::EngineUnavailable(reason) => {
                warn!(reason = %reason, "Rejected execution, sandbox engine unavailable");
            }
            ExecutionError::Timeout { .. } => {
                warn!(error = %err, "Execution timed out");
            }
            _ => {
                error!(phase = err.phase(), error = %err, "Execution failed");
            }
        }
        ApiError::internal(err.to_string())
    }
}

/// `GET /`
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// `GET /health/engine`
pub async fn engine_health(State(state): State<AppState>) -> Response {
    let current = state.context.state().await;
    let status = if current == ConnectionState::Connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "state": current.to_string() }))).into_response()
}

/// `POST /api/execute`
pub async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        debug!(error = %rejection, "Rejected request body");
        ApiError::bad_request("Invalid request body")
    })?;

    let (language, code) = match (body.language, body.code) {
        (Some(language), Some(code)) if !language.trim().is_empty() && !code.is_empty() => {
            (language, code)
        }
        _ => return Err(ExecutionError::EmptyCode.into()),
    };

    let mut request = ExecutionRequest::new(language, code);
    if let Some(input) = body.input {
        request = request.with_input(input);
    }

    let outcome = state.executor.execute(request).await?;
    respond(outcome)
}

/// Collapses an outcome into the public reply: a non-zero exit becomes an
/// error carrying stderr, or a generic message when stderr is empty.
fn respond(outcome: ExecutionOutcome) -> Result<Json<ExecuteResponse>, ApiError> {
    if outcome.succeeded() {
        return Ok(Json(ExecuteResponse {
            output: outcome.stdout,
            error: outcome.stderr,
        }));
    }

    debug!(
        job_id = %outcome.job_id,
        exit_code = outcome.exit_code,
        "Program exited with non-zero status"
    );
    if outcome.stderr.is_empty() {
        Err(ApiError::internal(format!(
            "Process exited with code {}",
            outcome.exit_code
        )))
    } else {
        Err(ApiError::internal(outcome.stderr))
    }
}
