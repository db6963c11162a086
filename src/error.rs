use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("A workflow is already running")]
    AlreadyRunning,

    #[error("Workflow was reset before it finished")]
    Superseded,

    #[error("{action} failed: {status}")]
    Request { action: String, status: String },

    #[error("Polling failed: Status check failed: {0}")]
    StatusCheck(String),

    #[error("Polling failed: {0}")]
    OperationFailed(String),

    #[error("Operation timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Backend response missing field: {0}")]
    MissingField(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors raised before any request was issued.
    pub fn is_precondition(&self) -> bool {
        matches!(self, AppError::InvalidRequest(_) | AppError::AlreadyRunning)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
