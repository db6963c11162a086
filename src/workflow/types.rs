use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the four sequential processing phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Analysis,
    Pipeline,
    Validation,
    Review,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Analysis,
        Stage::Pipeline,
        Stage::Validation,
        Stage::Review,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Stage::Analysis => "analysis",
            Stage::Pipeline => "pipeline",
            Stage::Validation => "validation",
            Stage::Review => "review",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Analysis => "Repository Analysis",
            Stage::Pipeline => "Pipeline Generation",
            Stage::Validation => "Pipeline Validation",
            Stage::Review => "Code Review",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Progress through the workflow while this stage is running, in percent.
    pub fn progress_percent(&self) -> u8 {
        (((self.index() + 1) * 100) / Stage::ALL.len()) as u8
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Focus areas offered for code review. Other tags are passed through as-is.
pub const KNOWN_FOCUS_AREAS: [&str; 3] = ["security", "performance", "best-practices"];

pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub repository_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

impl WorkflowRequest {
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            branch: default_branch(),
            focus_areas: Vec::new(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_focus_areas<I, S>(mut self, areas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.focus_areas = areas.into_iter().map(Into::into).collect();
        self
    }

    /// Trim fields, default an empty branch and drop duplicate focus areas.
    pub fn normalized(mut self) -> Self {
        self.repository_url = self.repository_url.trim().to_string();
        self.branch = self.branch.trim().to_string();
        if self.branch.is_empty() {
            self.branch = default_branch();
        }
        let mut seen = std::collections::HashSet::new();
        self.focus_areas = self
            .focus_areas
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty() && seen.insert(a.clone()))
            .collect();
        self
    }

    /// Focus areas outside `KNOWN_FOCUS_AREAS`.
    pub fn unknown_focus_areas(&self) -> Vec<&str> {
        self.focus_areas
            .iter()
            .map(String::as_str)
            .filter(|a| !KNOWN_FOCUS_AREAS.contains(a))
            .collect()
    }
}

/// Resolved payload per stage. Absent until that stage completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResults(BTreeMap<Stage, serde_json::Value>);

impl WorkflowResults {
    pub fn get(&self, stage: Stage) -> Option<&serde_json::Value> {
        self.0.get(&stage)
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.0.contains_key(&stage)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn insert(&mut self, stage: Stage, payload: serde_json::Value) {
        self.0.insert(stage, payload);
    }

    pub(crate) fn remove(&mut self, stage: Stage) {
        self.0.remove(&stage);
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    /// The generated pipeline YAML, if the pipeline stage produced one.
    pub fn pipeline_yaml(&self) -> Option<&str> {
        self.get(Stage::Pipeline)?
            .get("pipeline_yaml")?
            .as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowState {
    pub is_running: bool,
    pub current_stage: Option<Stage>,
    pub results: WorkflowResults,
    pub error: Option<String>,
    /// Advisory notices, e.g. a stage answered with a mock result.
    pub warnings: Vec<String>,
    pub show_report_modal: bool,
    pub last_repository_url: String,
    pub last_branch: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl WorkflowState {
    pub(crate) fn new() -> Self {
        Self {
            last_branch: default_branch(),
            ..Default::default()
        }
    }

    /// True once every stage has a result.
    pub fn is_complete(&self) -> bool {
        Stage::ALL.iter().all(|s| self.results.contains(*s))
    }

    pub(crate) fn clear(&mut self) {
        self.is_running = false;
        self.current_stage = None;
        self.results.clear();
        self.error = None;
        self.warnings.clear();
        self.show_report_modal = false;
    }
}

/// Progress notifications broadcast by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    Started { repository_url: String },
    StageStarted(Stage),
    StageCompleted(Stage),
    /// The backend returned a degraded substitute result.
    FallbackDetected { stage: Stage, message: String },
    Completed,
    Failed { message: String },
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_progress() {
        assert!(Stage::Analysis < Stage::Pipeline);
        assert!(Stage::Validation < Stage::Review);
        assert_eq!(Stage::Review.index(), 3);
        assert_eq!(Stage::Analysis.progress_percent(), 25);
        assert_eq!(Stage::Review.progress_percent(), 100);
    }

    #[test]
    fn test_stage_serializes_to_wire_id() {
        assert_eq!(
            serde_json::to_value(Stage::Validation).unwrap(),
            serde_json::json!("validation")
        );
    }

    #[test]
    fn test_request_defaults_branch() {
        let req: WorkflowRequest =
            serde_json::from_str(r#"{"repository_url": "https://gitlab.com/acme/app"}"#).unwrap();
        assert_eq!(req.branch, "main");
        assert!(req.focus_areas.is_empty());

        let req = WorkflowRequest::new(" https://gitlab.com/acme/app ")
            .with_branch("  ")
            .with_focus_areas(["security", "security", " performance", ""])
            .normalized();
        assert_eq!(req.repository_url, "https://gitlab.com/acme/app");
        assert_eq!(req.branch, "main");
        assert_eq!(req.focus_areas, vec!["security", "performance"]);
        assert!(req.unknown_focus_areas().is_empty());
    }

    #[test]
    fn test_unknown_focus_areas() {
        let req = WorkflowRequest::new("https://gitlab.com/acme/app")
            .with_focus_areas(["best-practices", "accessibility"]);
        assert_eq!(req.unknown_focus_areas(), vec!["accessibility"]);
    }

    #[test]
    fn test_results_pipeline_yaml() {
        let mut results = WorkflowResults::default();
        assert!(results.pipeline_yaml().is_none());
        results.insert(
            Stage::Pipeline,
            serde_json::json!({ "pipeline_yaml": "stages: [build]" }),
        );
        assert_eq!(results.pipeline_yaml(), Some("stages: [build]"));
    }

    #[test]
    fn test_results_serialize_keyed_by_stage() {
        let mut results = WorkflowResults::default();
        results.insert(Stage::Analysis, serde_json::json!({ "ok": true }));
        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            serde_json::json!({ "analysis": { "ok": true } })
        );
    }
}
