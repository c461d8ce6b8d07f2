use async_trait::async_trait;

use crate::error::Error;
use crate::settings::Settings;

/// Everything the review agent needs for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    pub url: String,
    /// Slash command, e.g. `/review` or `/ask What does this change?`.
    pub command: String,
    /// Effective settings for this request only.
    pub settings: Settings,
}

impl AgentRequest {
    pub fn new(url: impl Into<String>, command: impl Into<String>, settings: Settings) -> Self {
        Self {
            url: url.into(),
            command: command.into(),
            settings,
        }
    }
}

/// External agent that fetches a pull request and produces review text.
///
/// `Ok(None)` means the agent finished without producing any content.
#[async_trait]
pub trait ReviewAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn handle_request(&self, request: AgentRequest) -> Result<Option<String>, Error>;
}
