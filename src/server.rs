use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::api::handler;
use crate::backend::{Backend, HttpBackend};
use crate::config::AppConfig;
use crate::workflow::{PollPolicy, WorkflowOrchestrator};

pub struct AppState {
    pub orchestrator: Arc<WorkflowOrchestrator>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> crate::error::Result<Self> {
        let backend = Arc::new(HttpBackend::new(config)?);
        let policy = PollPolicy::from(&config.polling);
        Ok(Self::with_backend(backend, policy))
    }

    pub fn with_backend(backend: Arc<dyn Backend>, policy: PollPolicy) -> Self {
        Self {
            orchestrator: Arc::new(WorkflowOrchestrator::new(backend, policy)),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/workflow",
            get(handler::get_workflow).post(handler::start_workflow),
        )
        .route("/workflow/reset", post(handler::reset_workflow))
        .route("/workflow/pipeline-ai", post(handler::generate_pipeline_ai))
        .route("/workflow/validate-ai", post(handler::validate_pipeline_ai))
        .route("/workflow/report", get(handler::get_report))
        .route("/workflow/report/dismiss", post(handler::dismiss_report))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
