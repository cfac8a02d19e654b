//! HTTP surface of the service.
//!
//! ```text
//! GET  /               liveness
//! GET  /health/engine  sandbox engine connection state
//! GET  /metrics        Prometheus text format
//! POST /api/execute    run a code submission
//! ```

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::execution::{EngineContext, Executor};
use crate::metrics::metrics_handler;

/// State shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<Executor>,
    pub context: Arc<EngineContext>,
}

impl AppState {
    pub fn new(executor: Arc<Executor>) -> Self {
        let context = Arc::clone(executor.context());
        Self { executor, context }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/health/engine", get(handlers::engine_health))
        .route("/metrics", get(metrics_handler))
        .route("/api/execute", post(handlers::execute))
        .with_state(state)
}
