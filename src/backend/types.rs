use serde::{Deserialize, Serialize};

/// Backend endpoints that start an asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Analyze,
    GeneratePipeline,
    GeneratePipelineAi,
    Validate,
    ValidatePipelineAi,
    CodeReview,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Analyze => "/analyze",
            Endpoint::GeneratePipeline => "/generate-pipeline",
            Endpoint::GeneratePipelineAi => "/generate-pipeline-ai",
            Endpoint::Validate => "/validate",
            Endpoint::ValidatePipelineAi => "/validate-pipeline-ai",
            Endpoint::CodeReview => "/code-review",
        }
    }

    /// Name of the field carrying the operation handle in the submit response.
    pub fn handle_field(&self) -> &'static str {
        match self {
            Endpoint::CodeReview => "review_id",
            _ => "operation_id",
        }
    }

    /// Human-readable action name used in error messages.
    pub fn action(&self) -> &'static str {
        match self {
            Endpoint::Analyze => "Analysis",
            Endpoint::GeneratePipeline => "Pipeline generation",
            Endpoint::GeneratePipelineAi => "AI pipeline generation",
            Endpoint::Validate => "Validation",
            Endpoint::ValidatePipelineAi => "AI pipeline validation",
            Endpoint::CodeReview => "Code review",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Opaque identifier of a backend job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(pub String);

impl OperationHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Request types ---

#[derive(Debug, Clone, Serialize)]
pub struct RepoRequest {
    pub repo_url: String,
    pub branch: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateRequest {
    pub pipeline_yaml: String,
    pub repo_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest {
    pub repo_url: String,
    pub branch: String,
    pub focus_areas: Vec<String>,
}

// --- Response types ---

/// Response to a job submission. Which field is populated depends on the endpoint.
///
/// Ids are opaque: strings and numbers are both accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub operation_id: Option<serde_json::Value>,
    #[serde(default)]
    pub review_id: Option<serde_json::Value>,
}

impl SubmitResponse {
    pub fn handle_for(&self, endpoint: Endpoint) -> Option<OperationHandle> {
        let id = match endpoint {
            Endpoint::CodeReview => self.review_id.as_ref(),
            _ => self.operation_id.as_ref(),
        };
        let id = match id? {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!id.is_empty()).then_some(OperationHandle(id))
    }
}

/// One answer from the status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReply {
    /// The backend does not know the operation (yet).
    NotFound,
    /// Raw status envelope.
    Envelope(serde_json::Value),
}
