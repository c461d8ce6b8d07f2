//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::agent::{AgentRequest, ReviewAgent};
use crate::error::Error;
use crate::progress::ProgressReporter;

/// A mock agent that returns pre-configured responses.
pub struct MockAgent {
    responses: Mutex<Vec<Result<Option<String>, Error>>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<AgentRequest>>,
    pub name: String,
}

impl MockAgent {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            captured_requests: Mutex::new(Vec::new()),
            name: "mock".to_string(),
        }
    }

    /// Queue text to be returned by the next handle_request() call.
    /// Responses are returned in FIFO order (first queued = first returned).
    pub fn queue_response(&self, content: &str) {
        self.queue_raw(Ok(Some(content.to_string())));
    }

    /// Queue a completion that produced no content.
    pub fn queue_empty(&self) {
        self.queue_raw(Ok(None));
    }

    /// Queue a failure.
    pub fn queue_error(&self, error: Error) {
        self.queue_raw(Err(error));
    }

    pub fn queue_raw(&self, response: Result<Option<String>, Error>) {
        self.responses.lock().unwrap().insert(0, response);
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    /// Get the last captured request.
    pub fn last_request(&self) -> Option<AgentRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReviewAgent for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle_request(&self, request: AgentRequest) -> Result<Option<String>, Error> {
        self.captured_requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(Err(Error::agent("No mock response queued")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Info(String),
    Progress { completed: u32, total: u32 },
}

/// A progress reporter that records every update.
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressReporter for RecordingProgress {
    async fn info(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(ProgressEvent::Info(message.to_string()));
    }

    async fn progress(&self, completed: u32, total: u32) {
        self.events
            .lock()
            .unwrap()
            .push(ProgressEvent::Progress { completed, total });
    }
}
