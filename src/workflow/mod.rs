pub mod fallback;
pub mod orchestrator;
pub mod poll;
pub mod types;

pub use orchestrator::WorkflowOrchestrator;
pub use poll::{poll_operation, OperationStatus, PollPolicy};
pub use types::{Stage, WorkflowEvent, WorkflowRequest, WorkflowResults, WorkflowState};
