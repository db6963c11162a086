use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::backend::types::{Endpoint, RepoRequest, ReviewRequest, ValidateRequest};
use crate::backend::Backend;
use crate::error::{AppError, Result};
use crate::workflow::fallback;
use crate::workflow::poll::{poll_operation, PollPolicy};
use crate::workflow::types::{Stage, WorkflowEvent, WorkflowRequest, WorkflowState};

const EVENT_CHANNEL_CAPACITY: usize = 64;

const MISSING_REPOSITORY_URL: &str =
    "Repository URL is missing or invalid. Please start the workflow analysis first.";

/// Drives a repository through the four backend stages and owns the
/// resulting workflow state.
///
/// Only one action (a full run or a single-stage regeneration) may be in
/// flight at a time. `reset_workflow` invalidates any in-flight action: its
/// later results are dropped instead of written into the fresh state.
pub struct WorkflowOrchestrator {
    backend: Arc<dyn Backend>,
    policy: PollPolicy,
    state: watch::Sender<WorkflowState>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowOrchestrator {
    pub fn new(backend: Arc<dyn Backend>, policy: PollPolicy) -> Self {
        let (state, _) = watch::channel(WorkflowState::new());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            policy,
            state,
            events,
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> WorkflowState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }

    /// Progress events. Slow receivers may miss events.
    pub fn events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Run all four stages for `request`.
    ///
    /// Failures are recorded in `state.error` and also returned. Results of
    /// stages completed before the failure are kept.
    pub async fn start_workflow(&self, request: WorkflowRequest) -> Result<WorkflowState> {
        let (generation, request) = self.begin_workflow(request)?;
        self.drive_workflow(generation, request).await
    }

    /// Like `start_workflow`, but returns as soon as the run has been
    /// accepted. Precondition errors are reported synchronously.
    pub fn spawn_workflow(
        self: &Arc<Self>,
        request: WorkflowRequest,
    ) -> Result<JoinHandle<Result<WorkflowState>>> {
        let (generation, request) = self.begin_workflow(request)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            this.drive_workflow(generation, request).await
        }))
    }

    /// Clear the workflow state. Safe to call at any time, including mid-run.
    pub fn reset_workflow(&self) {
        self.state.send_modify(|s| {
            s.generation += 1;
            s.clear();
            s.started_at = None;
            s.finished_at = None;
        });
        tracing::info!("Workflow reset");
        self.emit(WorkflowEvent::Reset);
    }

    pub fn dismiss_report(&self) {
        self.state.send_if_modified(|s| std::mem::replace(&mut s.show_report_modal, false));
    }

    /// Regenerate only the pipeline stage with the AI-specific endpoint,
    /// for the repository of the last `start_workflow` call.
    ///
    /// Validation and review results are left as they are.
    pub async fn generate_pipeline_with_ai(&self) -> Result<WorkflowState> {
        let (generation, body) = self.begin_pipeline_ai()?;
        self.drive_single_stage(generation, Stage::Pipeline, Endpoint::GeneratePipelineAi, body)
            .await
    }

    pub fn spawn_generate_pipeline_with_ai(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Result<WorkflowState>>> {
        let (generation, body) = self.begin_pipeline_ai()?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            this.drive_single_stage(generation, Stage::Pipeline, Endpoint::GeneratePipelineAi, body)
                .await
        }))
    }

    /// Re-validate `pipeline_yaml` with the AI-specific endpoint.
    pub async fn validate_pipeline_with_ai(&self, pipeline_yaml: &str) -> Result<WorkflowState> {
        let (generation, body) = self.begin_validation_ai(pipeline_yaml)?;
        self.drive_single_stage(
            generation,
            Stage::Validation,
            Endpoint::ValidatePipelineAi,
            body,
        )
        .await
    }

    pub fn spawn_validate_pipeline_with_ai(
        self: &Arc<Self>,
        pipeline_yaml: &str,
    ) -> Result<JoinHandle<Result<WorkflowState>>> {
        let (generation, body) = self.begin_validation_ai(pipeline_yaml)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            this.drive_single_stage(
                generation,
                Stage::Validation,
                Endpoint::ValidatePipelineAi,
                body,
            )
            .await
        }))
    }

    // --- Action setup ---

    fn begin_workflow(&self, request: WorkflowRequest) -> Result<(u64, WorkflowRequest)> {
        let request = request.normalized();
        if !is_http_url(&request.repository_url) {
            return self.reject(AppError::InvalidRequest(format!(
                "Invalid repository URL: {:?}",
                request.repository_url
            )));
        }
        let unknown = request.unknown_focus_areas();
        if !unknown.is_empty() {
            tracing::warn!(focus_areas = ?unknown, "Passing unknown focus areas to code review");
        }

        let generation = self.begin(|s| {
            s.results.clear();
            s.warnings.clear();
            s.show_report_modal = false;
            s.last_repository_url = request.repository_url.clone();
            s.last_branch = request.branch.clone();
        })?;

        tracing::info!(
            repo = %request.repository_url,
            branch = %request.branch,
            focus_areas = ?request.focus_areas,
            "Workflow started"
        );
        self.emit(WorkflowEvent::Started {
            repository_url: request.repository_url.clone(),
        });

        Ok((generation, request))
    }

    fn begin_pipeline_ai(&self) -> Result<(u64, Value)> {
        let (repo_url, branch) = self.remembered_repository()?;
        let body = serde_json::to_value(RepoRequest { repo_url, branch })?;
        let generation = self.begin(|s| s.results.remove(Stage::Pipeline))?;
        Ok((generation, body))
    }

    fn begin_validation_ai(&self, pipeline_yaml: &str) -> Result<(u64, Value)> {
        let (repo_url, _) = self.remembered_repository()?;
        if pipeline_yaml.trim().is_empty() {
            return self.reject(AppError::InvalidRequest(
                "No pipeline to validate. Generate a pipeline first.".to_string(),
            ));
        }
        let body = serde_json::to_value(ValidateRequest {
            pipeline_yaml: pipeline_yaml.to_string(),
            repo_url,
        })?;
        let generation = self.begin(|s| s.results.remove(Stage::Validation))?;
        Ok((generation, body))
    }

    fn remembered_repository(&self) -> Result<(String, String)> {
        let (url, branch) = {
            let s = self.state.borrow();
            (s.last_repository_url.clone(), s.last_branch.clone())
        };
        if !is_http_url(&url) {
            tracing::error!(repo = %url, "Invalid repository URL for AI regeneration");
            return self.reject(AppError::InvalidRequest(MISSING_REPOSITORY_URL.to_string()));
        }
        Ok((url, branch))
    }

    fn reject<T>(&self, err: AppError) -> Result<T> {
        self.emit(WorkflowEvent::Failed {
            message: err.to_string(),
        });
        Err(err)
    }

    /// Mark an action as running. Fails if one is already in flight.
    fn begin(&self, prepare: impl FnOnce(&mut WorkflowState)) -> Result<u64> {
        let mut generation = None;
        self.state.send_if_modified(|s| {
            if s.is_running {
                return false;
            }
            s.generation += 1;
            s.is_running = true;
            s.current_stage = None;
            s.error = None;
            s.started_at = Some(Utc::now());
            s.finished_at = None;
            prepare(s);
            generation = Some(s.generation);
            true
        });
        generation.ok_or(AppError::AlreadyRunning)
    }

    // --- Action execution ---

    async fn drive_workflow(&self, generation: u64, request: WorkflowRequest) -> Result<WorkflowState> {
        let outcome = self.run_stages(generation, &request).await;
        self.finish(generation, outcome, true)
    }

    async fn drive_single_stage(
        &self,
        generation: u64,
        stage: Stage,
        endpoint: Endpoint,
        body: Value,
    ) -> Result<WorkflowState> {
        let outcome = self
            .run_stage(generation, stage, endpoint, body)
            .await
            .map(|_| ());
        self.finish(generation, outcome, false)
    }

    async fn run_stages(&self, generation: u64, request: &WorkflowRequest) -> Result<()> {
        let repo = RepoRequest {
            repo_url: request.repository_url.clone(),
            branch: request.branch.clone(),
        };

        self.run_stage(
            generation,
            Stage::Analysis,
            Endpoint::Analyze,
            serde_json::to_value(&repo)?,
        )
        .await?;

        let pipeline = self
            .run_stage(
                generation,
                Stage::Pipeline,
                Endpoint::GeneratePipeline,
                serde_json::to_value(&repo)?,
            )
            .await?;

        let pipeline_yaml = pipeline
            .get("pipeline_yaml")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::MissingField("pipeline_yaml".to_string()))?;

        self.run_stage(
            generation,
            Stage::Validation,
            Endpoint::Validate,
            serde_json::to_value(ValidateRequest {
                pipeline_yaml: pipeline_yaml.to_string(),
                repo_url: request.repository_url.clone(),
            })?,
        )
        .await?;

        self.run_stage(
            generation,
            Stage::Review,
            Endpoint::CodeReview,
            serde_json::to_value(ReviewRequest {
                repo_url: request.repository_url.clone(),
                branch: request.branch.clone(),
                focus_areas: request.focus_areas.clone(),
            })?,
        )
        .await?;

        Ok(())
    }

    /// Submit one job, poll it to completion and store its payload.
    async fn run_stage(
        &self,
        generation: u64,
        stage: Stage,
        endpoint: Endpoint,
        body: Value,
    ) -> Result<Value> {
        if !self.update(generation, |s| s.current_stage = Some(stage)) {
            return Err(AppError::Superseded);
        }
        tracing::info!(stage = %stage, endpoint = %endpoint, "Stage started");
        self.emit(WorkflowEvent::StageStarted(stage));

        let response = self.backend.submit(endpoint, body).await?;
        let handle = response
            .handle_for(endpoint)
            .ok_or_else(|| AppError::MissingField(endpoint.handle_field().to_string()))?;

        tracing::debug!(stage = %stage, operation = %handle, "Polling operation");
        let payload = poll_operation(self.backend.as_ref(), &handle, &self.policy).await?;

        let fallback_text = fallback::detect(&payload);
        let warning = fallback_text.as_ref().map(|_| fallback::warning_for(stage));

        let stored = self.update(generation, |s| {
            s.results.insert(stage, payload.clone());
            if let Some(ref w) = warning {
                s.warnings.push(w.clone());
            }
        });
        if !stored {
            return Err(AppError::Superseded);
        }

        tracing::info!(stage = %stage, "Stage completed");
        self.emit(WorkflowEvent::StageCompleted(stage));

        if let Some(message) = warning {
            tracing::warn!(
                stage = %stage,
                text = %fallback_text.unwrap_or_default(),
                "Backend returned a fallback result"
            );
            self.emit(WorkflowEvent::FallbackDetected { stage, message });
        }

        Ok(payload)
    }

    fn finish(&self, generation: u64, outcome: Result<()>, full_run: bool) -> Result<WorkflowState> {
        match outcome {
            Ok(()) => {
                self.update(generation, |s| {
                    s.is_running = false;
                    s.current_stage = None;
                    s.finished_at = Some(Utc::now());
                    if full_run {
                        s.show_report_modal = true;
                    }
                });
                tracing::info!("Workflow action completed");
                self.emit(WorkflowEvent::Completed);
                Ok(self.state())
            }
            Err(AppError::Superseded) => {
                tracing::info!("Abandoned workflow action finished after reset");
                Err(AppError::Superseded)
            }
            Err(e) => {
                let message = e.to_string();
                let recorded = self.update(generation, |s| {
                    s.is_running = false;
                    s.current_stage = None;
                    s.finished_at = Some(Utc::now());
                    s.error = Some(message.clone());
                });
                if recorded {
                    tracing::error!(error = %message, "Workflow failed");
                    self.emit(WorkflowEvent::Failed { message });
                }
                Err(e)
            }
        }
    }

    /// Apply `f` if `generation` is still current. Returns whether it was applied.
    fn update(&self, generation: u64, f: impl FnOnce(&mut WorkflowState)) -> bool {
        self.state.send_if_modified(|s| {
            if s.generation != generation {
                tracing::debug!(
                    stale = generation,
                    current = s.generation,
                    "Dropping update from superseded workflow action"
                );
                return false;
            }
            f(s);
            true
        })
    }

    fn emit(&self, event: WorkflowEvent) {
        let _ = self.events.send(event);
    }
}

fn is_http_url(url: &str) -> bool {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .map_or(false, |rest| !rest.trim().is_empty())
}
