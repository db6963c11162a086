//! Best-effort detection of degraded backend results.
//!
//! When the backend cannot reach its AI provider it still answers with a
//! substitute result and says so in free text. This is a substring heuristic
//! over a few known fields; it is advisory and never fails a stage.

use serde_json::Value;

use super::types::Stage;

const TEXT_FIELDS: [&str; 2] = ["message", "summary"];

const MARKERS: [&str; 3] = ["mock", "fallback", "openai review failed"];

/// Returns the offending text if `payload` looks like a mock or fallback result.
pub fn detect(payload: &Value) -> Option<String> {
    TEXT_FIELDS
        .iter()
        .filter_map(|field| payload.get(field).and_then(Value::as_str))
        .find(|text| {
            let lower = text.to_lowercase();
            MARKERS.iter().any(|m| lower.contains(m))
        })
        .map(str::to_string)
}

/// User-facing warning for a stage that returned a fallback result.
pub fn warning_for(stage: Stage) -> String {
    match stage {
        Stage::Review => {
            "AI code review could not be performed due to API limits. Showing a mock review instead."
                .to_string()
        }
        other => format!(
            "{} returned a fallback result instead of a full AI result.",
            other.label()
        ),
    }
}
