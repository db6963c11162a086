use std::time::Duration;

use serde_json::Value;

use crate::backend::types::{OperationHandle, StatusReply};
use crate::backend::Backend;
use crate::config::PollingConfig;
use crate::error::{AppError, Result};

/// Timing and budget of one status-polling loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Wait before the first status request.
    pub initial_delay: Duration,
    /// Wait between pending responses.
    pub interval: Duration,
    /// Pending responses tolerated before giving up.
    pub max_attempts: u32,
    /// First wait after a not-found response.
    pub not_found_initial: Duration,
    pub not_found_factor: f64,
    pub not_found_max: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            interval: Duration::from_millis(config.interval_ms),
            max_attempts: config.max_attempts,
            not_found_initial: Duration::from_millis(config.not_found_initial_ms),
            not_found_factor: config.not_found_factor,
            not_found_max: Duration::from_millis(config.not_found_max_ms),
        }
    }
}

impl PollPolicy {
    fn next_not_found_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.not_found_factor)
            .map_or(self.not_found_max, |d| d.min(self.not_found_max))
    }
}

/// Decoded status envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Pending,
    Succeeded(Value),
    /// Like `Succeeded`; reviews report their fields directly on the envelope.
    Completed(Value),
    Failed(String),
}

impl OperationStatus {
    pub fn from_envelope(envelope: Value) -> Self {
        let status = envelope
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match status.as_str() {
            "success" => OperationStatus::Succeeded(extract_payload(&envelope)),
            "completed" => {
                if envelope.get("review_id").is_some() {
                    OperationStatus::Completed(envelope)
                } else {
                    OperationStatus::Completed(extract_payload(&envelope))
                }
            }
            "error" => OperationStatus::Failed(
                envelope
                    .get("error")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .unwrap_or("Operation failed")
                    .to_string(),
            ),
            _ => OperationStatus::Pending,
        }
    }
}

/// Transport and decode failures while polling are reported as poll failures.
fn poll_error(err: AppError) -> AppError {
    match err {
        AppError::Http(_) | AppError::Serialization(_) => AppError::OperationFailed(err.to_string()),
        other => other,
    }
}

fn extract_payload(envelope: &Value) -> Value {
    envelope
        .get("result")
        .or_else(|| envelope.get("data"))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Poll `handle` until the job resolves, fails or exhausts `policy.max_attempts`.
///
/// Not-found replies are retried with a capped exponential backoff and do not
/// count against the attempt budget. The backoff is local to this call.
pub async fn poll_operation(
    backend: &dyn Backend,
    handle: &OperationHandle,
    policy: &PollPolicy,
) -> Result<Value> {
    tokio::time::sleep(policy.initial_delay).await;

    let mut attempts = 0u32;
    let mut not_found_delay = policy.not_found_initial;

    while attempts < policy.max_attempts {
        let envelope = match backend.status(handle).await.map_err(poll_error)? {
            StatusReply::NotFound => {
                tracing::debug!(
                    operation = %handle,
                    retry_in_ms = not_found_delay.as_millis() as u64,
                    "Operation not found yet"
                );
                tokio::time::sleep(not_found_delay).await;
                not_found_delay = policy.next_not_found_delay(not_found_delay);
                continue;
            }
            StatusReply::Envelope(envelope) => envelope,
        };

        match OperationStatus::from_envelope(envelope) {
            OperationStatus::Succeeded(payload) | OperationStatus::Completed(payload) => {
                tracing::debug!(operation = %handle, attempts, "Operation resolved");
                return Ok(payload);
            }
            OperationStatus::Failed(message) => {
                tracing::warn!(operation = %handle, error = %message, "Operation failed");
                return Err(AppError::OperationFailed(message));
            }
            OperationStatus::Pending => {
                attempts += 1;
                tracing::trace!(operation = %handle, attempts, "Operation still pending");
                if attempts < policy.max_attempts {
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }

    tracing::warn!(operation = %handle, attempts, "Operation timed out");
    Err(AppError::Timeout { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::scripted::{pending, success, ScriptedBackend};
    use serde_json::json;
    use tokio::time::Instant;

    fn handle(id: &str) -> OperationHandle {
        OperationHandle(id.to_string())
    }

    #[test]
    fn test_extracts_result_then_data() {
        assert_eq!(
            OperationStatus::from_envelope(json!({ "status": "success", "result": 1, "data": 2 })),
            OperationStatus::Succeeded(json!(1))
        );
        assert_eq!(
            OperationStatus::from_envelope(json!({ "status": "success", "data": 2 })),
            OperationStatus::Succeeded(json!(2))
        );
        assert_eq!(
            OperationStatus::from_envelope(json!({ "status": "completed", "data": { "a": 1 } })),
            OperationStatus::Completed(json!({ "a": 1 }))
        );
        assert_eq!(
            OperationStatus::from_envelope(json!({ "status": "success" })),
            OperationStatus::Succeeded(Value::Null)
        );
    }

    #[test]
    fn test_completed_review_returns_whole_envelope() {
        let envelope = json!({
            "status": "completed",
            "review_id": "r1",
            "score": 8.5,
            "summary": "Looks good",
            "result": { "ignored": true },
        });
        assert_eq!(
            OperationStatus::from_envelope(envelope.clone()),
            OperationStatus::Completed(envelope)
        );
    }

    #[test]
    fn test_error_and_unknown_statuses() {
        assert_eq!(
            OperationStatus::from_envelope(json!({ "status": "error", "error": "clone failed" })),
            OperationStatus::Failed("clone failed".to_string())
        );
        assert_eq!(
            OperationStatus::from_envelope(json!({ "status": "error" })),
            OperationStatus::Failed("Operation failed".to_string())
        );
        assert_eq!(
            OperationStatus::from_envelope(json!({ "status": "processing" })),
            OperationStatus::Pending
        );
        assert_eq!(
            OperationStatus::from_envelope(json!("garbage")),
            OperationStatus::Pending
        );
    }

    #[test]
    fn test_not_found_backoff_is_capped() {
        let policy = PollPolicy::default();
        let mut delay = policy.not_found_initial;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(delay.as_millis());
            delay = policy.next_not_found_delay(delay);
        }
        assert_eq!(seen, vec![1000, 1500, 2250, 3375, 5000, 5000]);
    }

    #[test]
    fn test_not_found_backoff_survives_oversized_factor() {
        let policy = PollPolicy {
            not_found_factor: 1e30,
            ..PollPolicy::default()
        };
        let delay = policy.next_not_found_delay(policy.not_found_initial);
        assert_eq!(delay, policy.not_found_max);

        let policy = PollPolicy {
            not_found_factor: f64::NAN,
            ..PollPolicy::default()
        };
        assert_eq!(
            policy.next_not_found_delay(policy.not_found_initial),
            policy.not_found_max
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_with_oversized_factor_resolves() {
        let backend = ScriptedBackend::new().on_status(
            "op",
            vec![StatusReply::NotFound, StatusReply::NotFound, success(json!(1))],
        );
        let policy = PollPolicy {
            not_found_factor: 1e30,
            ..PollPolicy::default()
        };

        let payload = poll_operation(&backend, &handle("op"), &policy).await.unwrap();
        assert_eq!(payload, json!(1));
    }

    #[test]
    fn test_decode_failure_is_poll_failure() {
        let decode = serde_json::from_str::<Value>("{").unwrap_err();
        let err = poll_error(AppError::Serialization(decode));
        assert!(matches!(err, AppError::OperationFailed(_)));
        assert!(err.to_string().starts_with("Polling failed: "), "{err}");

        let err = poll_error(AppError::StatusCheck("502 Bad Gateway".to_string()));
        assert!(matches!(err, AppError::StatusCheck(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_then_pending_then_success() {
        let backend = ScriptedBackend::new().on_status(
            "op",
            vec![
                StatusReply::NotFound,
                StatusReply::NotFound,
                pending(),
                success(json!({ "language": "rust" })),
            ],
        );

        let start = Instant::now();
        let payload = poll_operation(&backend, &handle("op"), &PollPolicy::default())
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(payload, json!({ "language": "rust" }));
        assert_eq!(backend.status_calls("op"), 4);
        // initial 5s + backoff 1s + 1.5s + one pending interval of 5s
        assert!(elapsed >= Duration::from_millis(12_500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(13_000), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_does_not_consume_attempts() {
        let mut replies = vec![StatusReply::NotFound; 10];
        replies.push(pending());
        replies.push(success(json!("done")));
        let backend = ScriptedBackend::new().on_status("op", replies);

        let policy = PollPolicy {
            max_attempts: 2,
            ..PollPolicy::default()
        };
        let payload = poll_operation(&backend, &handle("op"), &policy)
            .await
            .unwrap();
        assert_eq!(payload, json!("done"));
        assert_eq!(backend.status_calls("op"), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_attempts() {
        let backend = ScriptedBackend::new().on_status("op", vec![pending(); 61]);

        let err = poll_operation(&backend, &handle("op"), &PollPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Timeout { attempts: 60 }));
        assert_eq!(backend.status_calls("op"), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_error_status_fails() {
        let backend = ScriptedBackend::new().on_status(
            "op",
            vec![
                pending(),
                StatusReply::Envelope(json!({ "status": "error", "error": "repository not found" })),
            ],
        );

        let err = poll_operation(&backend, &handle("op"), &PollPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Polling failed: repository not found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_failure_fails_immediately() {
        let backend = ScriptedBackend::new().fail_status("op", 502);

        let err = poll_operation(&backend, &handle("op"), &PollPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StatusCheck(_)));
        assert_eq!(backend.status_calls("op"), 1);
    }
}
