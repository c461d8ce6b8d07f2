use async_trait::async_trait;

/// Sink for client-visible status updates while an operation runs.
///
/// Delivery is best effort. Implementations swallow their own failures so that
/// reporting never changes the outcome of an operation.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn info(&self, message: &str);

    async fn progress(&self, completed: u32, total: u32);
}

/// Reporter that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

#[async_trait]
impl ProgressReporter for NoProgress {
    async fn info(&self, _message: &str) {}

    async fn progress(&self, _completed: u32, _total: u32) {}
}
