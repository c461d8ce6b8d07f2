//! Request dispatch to the review agent.
//!
//! Every public operation returns a plain `String`: agent failures are logged and
//! rendered into the reply, never propagated to the caller.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error, info};

use crate::agent::{AgentRequest, ReviewAgent};
use crate::error::Error;
use crate::operation::{Operation, OperationRequest};
use crate::progress::ProgressReporter;
use crate::sections::format_bug_report;
use crate::settings::{RestorePolicy, Settings, SettingsOverlay};

pub struct Dispatcher {
    agent: Arc<dyn ReviewAgent>,
    baseline: RwLock<Settings>,
    restore: RestorePolicy,
}

impl Dispatcher {
    pub fn new(agent: Arc<dyn ReviewAgent>, baseline: Settings) -> Self {
        Self {
            agent,
            baseline: RwLock::new(baseline),
            restore: RestorePolicy::default(),
        }
    }

    pub fn with_restore_policy(mut self, restore: RestorePolicy) -> Self {
        self.restore = restore;
        self
    }

    pub fn restore_policy(&self) -> RestorePolicy {
        self.restore
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    /// Snapshot of the settings the next request starts from.
    pub fn baseline(&self) -> Settings {
        self.baseline
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn review(&self, url: &str, progress: &dyn ProgressReporter) -> String {
        self.run(Operation::Review, url, None, progress).await
    }

    pub async fn describe(&self, url: &str, progress: &dyn ProgressReporter) -> String {
        self.run(Operation::Describe, url, None, progress).await
    }

    pub async fn find_bugs(&self, url: &str, progress: &dyn ProgressReporter) -> String {
        self.run(Operation::FindBugs, url, None, progress).await
    }

    pub async fn improve(&self, url: &str, progress: &dyn ProgressReporter) -> String {
        self.run(Operation::Improve, url, None, progress).await
    }

    pub async fn ask(&self, url: &str, question: &str, progress: &dyn ProgressReporter) -> String {
        self.run(Operation::Ask, url, Some(question), progress).await
    }

    pub async fn reflect(&self, url: &str, progress: &dyn ProgressReporter) -> String {
        self.run(Operation::Reflect, url, None, progress).await
    }

    pub async fn analyze(&self, url: &str, progress: &dyn ProgressReporter) -> String {
        self.run(Operation::Analyze, url, None, progress).await
    }

    pub async fn explain(&self, url: &str, progress: &dyn ProgressReporter) -> String {
        self.run(Operation::Explain, url, None, progress).await
    }

    /// Build a request from raw inputs and dispatch it.
    pub async fn run(
        &self,
        operation: Operation,
        url: &str,
        extra_args: Option<&str>,
        progress: &dyn ProgressReporter,
    ) -> String {
        let request = match (operation, extra_args) {
            (Operation::Ask, question) => OperationRequest::ask(url, question.unwrap_or_default()),
            (operation, _) => OperationRequest::new(url, operation),
        };

        match request {
            Ok(request) => self.dispatch(&request, progress).await,
            Err(e) => {
                error!(operation = %operation, url = url, error = %e, "Rejected request");
                operation.error_message(&e)
            }
        }
    }

    pub async fn dispatch(
        &self,
        request: &OperationRequest,
        progress: &dyn ProgressReporter,
    ) -> String {
        let operation = request.operation();
        progress.info(&operation.start_message(request.url())).await;
        progress.progress(0, 1).await;

        match self.execute(request, progress).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    operation = %operation,
                    url = request.url(),
                    agent_failure = e.is_agent_failure(),
                    error = %e,
                    "{}",
                    operation.error_prefix()
                );
                operation.error_message(&e)
            }
        }
    }

    async fn execute(
        &self,
        request: &OperationRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<String, Error> {
        let operation = request.operation();
        let (settings, reset) = self.begin(operation);
        let agent_request = AgentRequest::new(request.url(), request.command(), settings);

        info!(
            operation = %operation,
            url = request.url(),
            command = %agent_request.command,
            agent = self.agent.name(),
            "Dispatching to agent"
        );

        let result = self.agent.handle_request(agent_request).await;
        drop(reset);
        let output = result?.filter(|text| !text.trim().is_empty());

        progress.progress(1, 1).await;

        let reply = match output {
            None => operation.empty_result_message().to_string(),
            Some(text) if operation == Operation::FindBugs => format_bug_report(&text),
            Some(text) => text,
        };
        debug!(operation = %operation, reply_len = reply.len(), "Operation complete");
        Ok(reply)
    }

    /// Effective settings for one request, plus the reset to run once the agent is done.
    fn begin(&self, operation: Operation) -> (Settings, Option<ResetGuard<'_>>) {
        let overlay = SettingsOverlay::for_operation(operation);
        match self.restore {
            RestorePolicy::All => (self.baseline().apply(&overlay), None),
            RestorePolicy::Partial => {
                let mut baseline = self
                    .baseline
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                *baseline = baseline.apply(&overlay);
                let guard = ResetGuard {
                    baseline: &self.baseline,
                    operation,
                };
                (baseline.clone(), Some(guard))
            }
        }
    }
}

/// Resets the keys an operation overrode in the shared baseline when dropped,
/// including when the request future is dropped mid-call.
struct ResetGuard<'a> {
    baseline: &'a RwLock<Settings>,
    operation: Operation,
}

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        let reset = SettingsOverlay::reset_for(self.operation);
        if reset.is_empty() {
            return;
        }
        let mut baseline = self
            .baseline
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *baseline = baseline.apply(&reset);
        debug!(operation = %self.operation, keys = reset.len(), "Reset overridden settings");
    }
}
