use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pam_core::{Dispatcher, Operation, ProgressReporter, RestorePolicy};
use pam_server::config::{is_secret_key, mask, Config, Transport};
use pam_server::server::{serve_http, serve_stdio, PrAgentServer};
use pam_server::setup;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: everything including agent command lines
    Trace,
    /// Verbose: settings snapshots, agent exit details
    Debug,
    /// Standard: one line per request
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "pr-agent-mcp")]
#[command(author, version, about = "MCP server for reviewing pull requests with PR-Agent", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/pr-agent-mcp/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Transport to serve (overrides config)
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,

    /// Listen address for the http transport (overrides config)
    #[arg(long)]
    pub bind: Option<String>,

    /// Restore policy for settings overrides: all or partial (overrides config)
    #[arg(long)]
    pub restore_overrides: Option<RestorePolicy>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the MCP tools (default)
    Serve,
    /// Run a single operation and print the result
    Run {
        /// review, describe, find-bugs, improve, ask, reflect, analyze or explain
        operation: String,
        /// Pull request URL
        pr_url: String,
        /// Question for the ask operation
        #[arg(short, long)]
        question: Option<String>,
    },
    /// Show current configuration
    Config,
    /// Initialize configuration in ~/.config/pr-agent-mcp
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_filter()));

    // stdout belongs to the stdio transport, so logs go to stderr or a file
    if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    if matches!(&cli.command, Some(Commands::Setup)) {
        return setup::run();
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(transport) = cli.transport {
        config.server.transport = transport;
    }
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(restore) = cli.restore_overrides {
        config.server.restore_overrides = restore;
    }

    match &cli.command {
        Some(Commands::Config) => show_config(&config),
        Some(Commands::Run {
            operation,
            pr_url,
            question,
        }) => run_once(&config, operation, pr_url, question.as_deref()).await,
        Some(Commands::Setup) => setup::run(),
        Some(Commands::Serve) | None => serve(&config).await,
    }
}

fn build_dispatcher(config: &Config) -> Dispatcher {
    let agent = config.build_agent();
    Dispatcher::new(Arc::new(agent), config.baseline_settings())
        .with_restore_policy(config.server.restore_overrides)
}

async fn serve(config: &Config) -> Result<()> {
    let dispatcher = Arc::new(build_dispatcher(config));
    tracing::info!(
        agent = dispatcher.agent_name(),
        restore = ?dispatcher.restore_policy(),
        settings = dispatcher.baseline().len(),
        "Starting PR-Agent MCP server"
    );
    let server = PrAgentServer::new(dispatcher, &config.server.name);

    match config.server.transport {
        Transport::Stdio => serve_stdio(server).await,
        Transport::Http => serve_http(server, &config.server.bind, &config.server.path).await,
    }
}

/// Progress reporter for one-shot runs: updates go to the log.
struct LogProgress;

#[async_trait]
impl ProgressReporter for LogProgress {
    async fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    async fn progress(&self, completed: u32, total: u32) {
        tracing::debug!(completed, total, "Progress");
    }
}

async fn run_once(
    config: &Config,
    operation: &str,
    pr_url: &str,
    question: Option<&str>,
) -> Result<()> {
    let operation: Operation = operation.parse()?;
    let dispatcher = build_dispatcher(config);
    let reply = dispatcher
        .run(operation, pr_url, question, &LogProgress)
        .await;
    println!("{}", reply);
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let path = Config::config_path()?;
    println!("Configuration");
    println!("=============\n");
    println!(
        "Config file: {}{}",
        path.display(),
        if path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!();

    let rendered = toml::to_string_pretty(&config.redacted())
        .context("Failed to render configuration")?;
    println!("{}", rendered);

    let baseline = config.baseline_settings();
    println!("Effective agent settings ({}):", baseline.len());
    for (key, value) in baseline.iter() {
        let value = value.to_string();
        let shown = if is_secret_key(key) { mask(&value) } else { value };
        println!("  {} = {}", key, shown);
    }

    Ok(())
}
