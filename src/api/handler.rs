use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::report;
use crate::server::AppState;
use crate::workflow::{WorkflowRequest, WorkflowState};

type ApiResult = Result<(StatusCode, Json<WorkflowState>), (StatusCode, Json<ErrorBody>)>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateAiBody {
    /// Defaults to the YAML of the current pipeline result.
    #[serde(default)]
    pub pipeline_yaml: Option<String>,
}

fn error_response(e: AppError) -> (StatusCode, Json<ErrorBody>) {
    let status = match e {
        AppError::AlreadyRunning => StatusCode::CONFLICT,
        AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(status = %status, error = %e, "Rejected workflow action");
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}

fn accepted(state: &AppState) -> ApiResult {
    Ok((StatusCode::ACCEPTED, Json(state.orchestrator.state())))
}

pub async fn get_workflow(State(state): State<Arc<AppState>>) -> Json<WorkflowState> {
    Json(state.orchestrator.state())
}

pub async fn start_workflow(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WorkflowRequest>,
) -> ApiResult {
    // The run continues in the background; its outcome lands in the workflow state.
    state
        .orchestrator
        .spawn_workflow(request)
        .map_err(error_response)?;
    accepted(&state)
}

pub async fn reset_workflow(State(state): State<Arc<AppState>>) -> Json<WorkflowState> {
    state.orchestrator.reset_workflow();
    Json(state.orchestrator.state())
}

pub async fn generate_pipeline_ai(State(state): State<Arc<AppState>>) -> ApiResult {
    state
        .orchestrator
        .spawn_generate_pipeline_with_ai()
        .map_err(error_response)?;
    accepted(&state)
}

pub async fn validate_pipeline_ai(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValidateAiBody>,
) -> ApiResult {
    let pipeline_yaml = match body.pipeline_yaml {
        Some(yaml) => yaml,
        None => state
            .orchestrator
            .state()
            .results
            .pipeline_yaml()
            .unwrap_or_default()
            .to_string(),
    };

    state
        .orchestrator
        .spawn_validate_pipeline_with_ai(&pipeline_yaml)
        .map_err(error_response)?;
    accepted(&state)
}

pub async fn get_report(State(state): State<Arc<AppState>>) -> String {
    report::render(&state.orchestrator.state())
}

pub async fn dismiss_report(State(state): State<Arc<AppState>>) -> Json<WorkflowState> {
    state.orchestrator.dismiss_report();
    Json(state.orchestrator.state())
}
