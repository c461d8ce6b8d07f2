use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

const CONFIG_TEMPLATE: &str = r#"# pr-agent-mcp configuration
#
# Agent credentials are read from environment variables by default:
#   OPENAI_API_KEY (or OPENAI_KEY), OPENAI_API_TYPE, OPENAI_API_VERSION,
#   OPENAI_API_BASE, OPENAI_API_DEPLOYMENT (or OPENAI_DEPLOYMENT_ID),
#   GITHUB_USER_TOKEN (or GITHUB_TOKEN), CONFIG_GIT_PROVIDER (or GIT_PROVIDER),
#   CONFIG_VERBOSITY_LEVEL (or VERBOSITY_LEVEL)
# Any value below can also be overridden with PAM_<SECTION>__<KEY>,
# e.g. PAM_SERVER__TRANSPORT=http

# ── Server ───────────────────────────────────────────────────────

[server]
name = "PR-Agent"
transport = "stdio"              # or "http"
# bind = "127.0.0.1:8000"        # http transport only
# path = "/mcp"

# "all": every request starts from the same settings.
# "partial": overrides stay in effect for later requests; bug scans only
#            reset require_security_review and extra_instructions.
restore_overrides = "all"

# ── Agent ────────────────────────────────────────────────────────

[agent]
program = "pr-agent"
# args = []
# working_dir = "~/src"

# [agent.env]
# PYTHONUNBUFFERED = "1"

# ── Agent settings ───────────────────────────────────────────────
# Passed to the agent as SECTION.KEY environment variables.

[settings.config]
publish_output = false

# [settings.pr_reviewer]
# num_max_findings = 5
"#;

pub fn run() -> Result<()> {
    let config_dir = Config::config_dir()?;
    let config_path = config_dir.join("config.toml");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    if config_path.exists() {
        println!("Existing config file found:");
        println!("  {}", config_path.display());
        print!("\nOverwrite? (Existing file will be backed up) [y/N] ");

        // Flush stdout so the prompt appears before reading
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }

        backup_file(&config_path)?;
    }

    std::fs::write(&config_path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Set credentials:   export OPENAI_API_KEY=\"sk-...\" GITHUB_USER_TOKEN=\"ghp_...\"");
    println!("  2. Try one review:    pr-agent-mcp run review <pr-url>");
    println!("  3. Register the server with your MCP client: pr-agent-mcp serve");

    Ok(())
}

/// Back up a file to <name>.bak, appending a timestamp if .bak already exists.
fn backup_file(path: &Path) -> Result<()> {
    let mut backup = path.with_extension("toml.bak");

    if backup.exists() {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let name = format!("toml.bak.{}", timestamp);
        backup = path.with_extension(name);
    }

    std::fs::rename(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;
    println!("  Backed up to {}", backup.display());

    Ok(())
}
