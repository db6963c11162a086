//! In-memory backend replaying scripted replies, for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::backend::types::*;
use crate::backend::Backend;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Submit(Endpoint, Value),
    Status(String),
}

enum SubmitScript {
    Handle(String),
    HttpError(u16),
}

enum StatusScript {
    Reply(StatusReply),
    HttpError(u16),
}

#[derive(Default)]
struct Script {
    submits: HashMap<Endpoint, VecDeque<SubmitScript>>,
    statuses: HashMap<String, VecDeque<StatusScript>>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    script: Mutex<Script>,
}

pub(crate) fn success(result: Value) -> StatusReply {
    StatusReply::Envelope(json!({ "status": "success", "result": result }))
}

pub(crate) fn pending() -> StatusReply {
    StatusReply::Envelope(json!({ "status": "pending" }))
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, endpoint: Endpoint, handle: &str) -> Self {
        self.push_submit(endpoint, SubmitScript::Handle(handle.to_string()))
    }

    pub fn fail_submit(self, endpoint: Endpoint, status: u16) -> Self {
        self.push_submit(endpoint, SubmitScript::HttpError(status))
    }

    pub fn on_status(self, handle: &str, replies: Vec<StatusReply>) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            let queue = script.statuses.entry(handle.to_string()).or_default();
            queue.extend(replies.into_iter().map(StatusScript::Reply));
        }
        self
    }

    pub fn fail_status(self, handle: &str, status: u16) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            script
                .statuses
                .entry(handle.to_string())
                .or_default()
                .push_back(StatusScript::HttpError(status));
        }
        self
    }

    fn push_submit(self, endpoint: Endpoint, entry: SubmitScript) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            script.submits.entry(endpoint).or_default().push_back(entry);
        }
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn submitted(&self) -> Vec<Endpoint> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Submit(endpoint, _) => Some(endpoint),
                Call::Status(_) => None,
            })
            .collect()
    }

    pub fn status_calls(&self, handle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Status(h) if h == handle))
            .count()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn submit(&self, endpoint: Endpoint, body: Value) -> Result<SubmitResponse> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::Submit(endpoint, body));

        match script.submits.get_mut(&endpoint).and_then(|q| q.pop_front()) {
            Some(SubmitScript::Handle(id)) => Ok(match endpoint {
                Endpoint::CodeReview => SubmitResponse {
                    operation_id: None,
                    review_id: Some(Value::String(id)),
                },
                _ => SubmitResponse {
                    operation_id: Some(Value::String(id)),
                    review_id: None,
                },
            }),
            Some(SubmitScript::HttpError(status)) => Err(AppError::Request {
                action: endpoint.action().to_string(),
                status: status.to_string(),
            }),
            None => Err(AppError::Internal(format!("unscripted submit to {endpoint}"))),
        }
    }

    async fn status(&self, handle: &OperationHandle) -> Result<StatusReply> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::Status(handle.to_string()));

        // An exhausted script keeps answering "pending".
        match script
            .statuses
            .get_mut(handle.as_str())
            .and_then(|q| q.pop_front())
        {
            Some(StatusScript::Reply(reply)) => Ok(reply),
            Some(StatusScript::HttpError(status)) => Err(AppError::StatusCheck(status.to_string())),
            None => Ok(pending()),
        }
    }
}
