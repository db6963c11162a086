//! Plain-text rendering of workflow results.

use std::fmt::Write;

use serde_json::Value;

use crate::workflow::types::{Stage, WorkflowState};

const NOT_AVAILABLE: &str = "N/A";

/// Render every available stage result plus run status as a Markdown report.
pub fn render(state: &WorkflowState) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Workflow report");
    let _ = writeln!(out);
    let _ = writeln!(out, "Repository: {}", or_na(&state.last_repository_url));
    let _ = writeln!(out, "Branch: {}", state.last_branch);
    let _ = writeln!(out, "Status: {}", status_line(state));
    if let Some(ref error) = state.error {
        let _ = writeln!(out, "Error: {error}");
    }
    for warning in &state.warnings {
        let _ = writeln!(out, "Warning: {warning}");
    }

    for stage in Stage::ALL {
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", stage.label());
        let _ = writeln!(out);
        match state.results.get(stage) {
            Some(data) => out.push_str(&render_stage(stage, data)),
            None => {
                let _ = writeln!(out, "No result.");
            }
        }
    }

    out
}

fn status_line(state: &WorkflowState) -> String {
    if state.is_running {
        match state.current_stage {
            Some(stage) => format!("running {} ({}%)", stage.label(), stage.progress_percent()),
            None => "running".to_string(),
        }
    } else if state.error.is_some() {
        "failed".to_string()
    } else if state.is_complete() {
        "completed".to_string()
    } else if state.results.is_empty() {
        "idle".to_string()
    } else {
        "partial".to_string()
    }
}

fn render_stage(stage: Stage, data: &Value) -> String {
    match stage {
        Stage::Analysis => render_analysis(data),
        Stage::Pipeline => render_pipeline(data),
        Stage::Validation => render_validation(data),
        Stage::Review => render_review(data),
    }
}

fn render_analysis(data: &Value) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Files: {}", array_len(data.pointer("/structure/files")));
    let _ = writeln!(
        out,
        "Directories: {}",
        array_len(data.pointer("/structure/directories"))
    );
    let _ = writeln!(
        out,
        "Language: {}",
        data.pointer("/analysis/language")
            .and_then(Value::as_str)
            .unwrap_or(NOT_AVAILABLE)
    );

    match data.get("dependencies").and_then(Value::as_object) {
        Some(deps) if !deps.is_empty() => {
            let names = deps.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
            let _ = writeln!(out, "Dependency files: {names}");
        }
        _ => {
            let _ = writeln!(out, "No dependencies found");
        }
    }
    out
}

fn render_pipeline(data: &Value) -> String {
    match data.get("pipeline_yaml").and_then(Value::as_str) {
        Some(yaml) => format!("```yaml\n{}\n```\n", yaml.trim_end()),
        None => "No pipeline generated\n".to_string(),
    }
}

fn render_validation(data: &Value) -> String {
    let mut out = String::new();
    let valid = data.get("valid").and_then(Value::as_bool).unwrap_or(false);
    let _ = writeln!(
        out,
        "{}",
        if valid {
            "Pipeline is valid"
        } else {
            "Pipeline has issues"
        }
    );

    for (title, key) in [
        ("Errors", "errors"),
        ("Warnings", "warnings"),
        ("Suggestions", "suggestions"),
    ] {
        let items = string_items(data.get(key));
        if items.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{title}:");
        for item in items {
            let _ = writeln!(out, "- {item}");
        }
    }
    out
}

fn render_review(data: &Value) -> String {
    let mut out = String::new();
    let score = data
        .get("score")
        .and_then(Value::as_f64)
        .map(|s| format!("{s:.1}"))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let findings = data
        .get("findings")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let _ = writeln!(out, "Score: {score}/10 ({} findings)", findings.len());

    if let Some(summary) = data.get("summary").and_then(Value::as_str) {
        let _ = writeln!(out, "\n{summary}");
    }

    for finding in findings {
        let field = |name| str_field(finding, name);
        let _ = writeln!(
            out,
            "\n### [{}] {}",
            field("severity").unwrap_or("info"),
            field("type").unwrap_or("finding")
        );
        if let Some(description) = field("description") {
            let _ = writeln!(out, "{description}");
        }
        if let Some(location) = field("location") {
            let _ = writeln!(out, "Location: {location}");
        }
        if let Some(recommendation) = field("recommendation") {
            let _ = writeln!(out, "Recommendation: {recommendation}");
        }
    }
    out
}

fn str_field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value.get(name).and_then(Value::as_str)
}

fn array_len(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .map(|a| a.len().to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn string_items(value: Option<&Value>) -> Vec<&str> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn or_na(s: &str) -> &str {
    if s.is_empty() {
        NOT_AVAILABLE
    } else {
        s
    }
}
