pub mod http;
pub mod types;

#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;

use crate::error::Result;
use types::*;

pub use http::HttpBackend;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Start an asynchronous job. Non-2xx responses are returned as `AppError::Request`.
    async fn submit(&self, endpoint: Endpoint, body: serde_json::Value) -> Result<SubmitResponse>;

    /// Query the status of a job. A 404 is reported as `StatusReply::NotFound`,
    /// any other non-2xx status as `AppError::StatusCheck`.
    async fn status(&self, handle: &OperationHandle) -> Result<StatusReply>;
}
