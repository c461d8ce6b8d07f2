//! MCP tool server exposing the dispatcher operations.
//!
//! Every tool call succeeds at the protocol level; failures are reported inside
//! the returned text.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rmcp::handler::server::router::prompt::PromptRouter;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, GetPromptRequestParams, GetPromptResult, ListPromptsResult,
    LoggingLevel, PaginatedRequestParams, LoggingMessageNotificationParam,
    ProgressNotificationParam, ProgressToken, PromptMessage, PromptMessageRole,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::{Peer, RequestContext};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{
    prompt, prompt_handler, prompt_router, tool, tool_handler, tool_router,
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info};

use pam_core::{Dispatcher, ProgressReporter};

const INSTRUCTIONS: &str = "Tools for reviewing pull requests with PR-Agent. \
Pass the full pull request URL. Results are returned as markdown text; failures \
are reported in the text and start with \"Error\".";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PrUrlArgs {
    /// The URL of the pull request
    pub pr_url: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AskArgs {
    /// The URL of the pull request
    pub pr_url: String,
    /// The question to ask about the pull request
    pub question: String,
}

#[derive(Clone)]
pub struct PrAgentServer {
    dispatcher: Arc<Dispatcher>,
    name: String,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

#[tool_router]
impl PrAgentServer {
    pub fn new(dispatcher: Arc<Dispatcher>, name: impl Into<String>) -> Self {
        Self {
            dispatcher,
            name: name.into(),
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    #[tool(description = "Review a pull request and provide feedback.")]
    async fn review_pr(
        &self,
        Parameters(args): Parameters<PrUrlArgs>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = McpProgress::new(&ctx);
        Ok(text_result(self.dispatcher.review(&args.pr_url, &progress).await))
    }

    #[tool(description = "Generate a description for a pull request based on its changes.")]
    async fn describe_pr(
        &self,
        Parameters(args): Parameters<PrUrlArgs>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = McpProgress::new(&ctx);
        Ok(text_result(self.dispatcher.describe(&args.pr_url, &progress).await))
    }

    #[tool(description = "Scan a pull request for potential bugs and issues.")]
    async fn find_bugs(
        &self,
        Parameters(args): Parameters<PrUrlArgs>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = McpProgress::new(&ctx);
        Ok(text_result(self.dispatcher.find_bugs(&args.pr_url, &progress).await))
    }

    #[tool(description = "Suggest code improvements for a pull request.")]
    async fn improve_pr(
        &self,
        Parameters(args): Parameters<PrUrlArgs>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = McpProgress::new(&ctx);
        Ok(text_result(self.dispatcher.improve(&args.pr_url, &progress).await))
    }

    #[tool(description = "Ask a specific question about a pull request.")]
    async fn ask_about_pr(
        &self,
        Parameters(args): Parameters<AskArgs>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = McpProgress::new(&ctx);
        let reply = self
            .dispatcher
            .ask(&args.pr_url, &args.question, &progress)
            .await;
        Ok(text_result(reply))
    }

    #[tool(description = "Reflect on a pull request's purpose and implementation.")]
    async fn reflect_on_pr(
        &self,
        Parameters(args): Parameters<PrUrlArgs>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = McpProgress::new(&ctx);
        Ok(text_result(self.dispatcher.reflect(&args.pr_url, &progress).await))
    }

    #[tool(description = "Perform a detailed code analysis of a pull request.")]
    async fn analyze_pr(
        &self,
        Parameters(args): Parameters<PrUrlArgs>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = McpProgress::new(&ctx);
        Ok(text_result(self.dispatcher.analyze(&args.pr_url, &progress).await))
    }

    #[tool(description = "Generate a simple explanation of what a pull request does.")]
    async fn explain_pr(
        &self,
        Parameters(args): Parameters<PrUrlArgs>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let progress = McpProgress::new(&ctx);
        Ok(text_result(self.dispatcher.explain(&args.pr_url, &progress).await))
    }
}

#[prompt_router]
impl PrAgentServer {
    #[prompt(
        name = "pr_review_prompt",
        description = "Create a prompt for reviewing a pull request"
    )]
    async fn pr_review_prompt(
        &self,
        Parameters(args): Parameters<PrUrlArgs>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            review_prompt(&args.pr_url),
        )])
    }

    #[prompt(
        name = "pr_improvement_prompt",
        description = "Create a prompt for suggesting improvements to a pull request"
    )]
    async fn pr_improvement_prompt(
        &self,
        Parameters(args): Parameters<PrUrlArgs>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            improvement_prompt(&args.pr_url),
        )])
    }
}

#[tool_handler]
#[prompt_handler]
impl ServerHandler for PrAgentServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder()
            .enable_tools()
            .enable_prompts()
            .enable_logging()
            .build();
        info.server_info.name = self.name.clone();
        info.server_info.version = env!("CARGO_PKG_VERSION").to_string();
        info.instructions = Some(INSTRUCTIONS.to_string());
        info
    }
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text)])
}

fn review_prompt(pr_url: &str) -> String {
    format!(
        "Please review the following pull request: {}\n\n\
         Some things to consider:\n\
         - Code correctness\n\
         - Performance improvements\n\
         - Security concerns\n\
         - Design issues\n\
         - Documentation updates needed",
        pr_url
    )
}

fn improvement_prompt(pr_url: &str) -> String {
    format!(
        "Please suggest improvements for the following pull request: {}\n\n\
         Focus on:\n\
         - Code quality\n\
         - Performance optimizations\n\
         - Better design patterns\n\
         - Potential edge cases\n\
         - Security improvements",
        pr_url
    )
}

/// Forwards dispatcher progress to the calling client as MCP notifications.
struct McpProgress {
    peer: Peer<RoleServer>,
    token: Option<ProgressToken>,
}

impl McpProgress {
    fn new(ctx: &RequestContext<RoleServer>) -> Self {
        Self {
            peer: ctx.peer.clone(),
            token: ctx.meta.get_progress_token(),
        }
    }
}

#[async_trait]
impl ProgressReporter for McpProgress {
    async fn info(&self, message: &str) {
        let param = LoggingMessageNotificationParam {
            level: LoggingLevel::Info,
            logger: Some("pr-agent".to_string()),
            data: serde_json::Value::String(message.to_string()),
        };
        if let Err(e) = self.peer.notify_logging_message(param).await {
            debug!(error = %e, "Failed to send log notification");
        }
    }

    async fn progress(&self, completed: u32, total: u32) {
        // Clients that did not ask for progress get none.
        let Some(token) = self.token.clone() else {
            return;
        };
        let param = ProgressNotificationParam {
            progress_token: token,
            progress: f64::from(completed),
            total: Some(f64::from(total)),
            message: None,
        };
        if let Err(e) = self.peer.notify_progress(param).await {
            debug!(error = %e, "Failed to send progress notification");
        }
    }
}

/// Serve over stdin/stdout until the client disconnects.
pub async fn serve_stdio(server: PrAgentServer) -> Result<()> {
    info!(name = %server.name, "Serving MCP over stdio");
    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .context("Failed to start MCP stdio server")?;
    let reason = service.waiting().await?;
    info!(?reason, "MCP session ended");
    Ok(())
}

/// Serve the streamable HTTP transport until Ctrl-C.
pub async fn serve_http(server: PrAgentServer, bind: &str, path: &str) -> Result<()> {
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let router = match path.trim_end_matches('/') {
        "" => axum::Router::new().fallback_service(service),
        path => axum::Router::new().nest_service(path, service),
    };

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(address = %bind, path = %path, "Serving MCP over HTTP");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;
    Ok(())
}
