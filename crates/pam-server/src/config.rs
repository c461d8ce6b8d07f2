use anyhow::{Context, Result};
use clap::ValueEnum;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use pam_agent::ProcessAgent;
use pam_core::{keys, RestorePolicy, SettingValue, Settings, SettingsOverlay};

/// Prefix for environment overrides of the config file (`PAM_SERVER__TRANSPORT=http`).
pub const ENV_PREFIX: &str = "PAM_";

/// Environment variables forwarded into the agent settings. For each key the
/// first listed variable that is set and non-empty wins.
pub const AGENT_ENV_VARS: &[(&str, &[&str])] = &[
    (keys::GIT_PROVIDER, &["CONFIG_GIT_PROVIDER", "GIT_PROVIDER"]),
    (keys::VERBOSITY_LEVEL, &["CONFIG_VERBOSITY_LEVEL", "VERBOSITY_LEVEL"]),
    (keys::OPENAI_KEY, &["OPENAI_API_KEY", "OPENAI_KEY"]),
    (keys::OPENAI_API_TYPE, &["OPENAI_API_TYPE"]),
    (keys::OPENAI_API_VERSION, &["OPENAI_API_VERSION"]),
    (keys::OPENAI_API_BASE, &["OPENAI_API_BASE"]),
    (keys::OPENAI_DEPLOYMENT_ID, &["OPENAI_API_DEPLOYMENT", "OPENAI_DEPLOYMENT_ID"]),
    (keys::GITHUB_USER_TOKEN, &["GITHUB_USER_TOKEN", "GITHUB_TOKEN"]),
];

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("env reference pattern is valid")
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    /// Baseline agent settings, `[settings.<section>] key = value`
    #[serde(default)]
    pub settings: BTreeMap<String, BTreeMap<String, SettingValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// JSON-RPC over stdin/stdout
    #[default]
    Stdio,
    /// Streamable HTTP endpoint
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name reported to MCP clients
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub transport: Transport,

    /// Listen address for the http transport
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Endpoint path for the http transport
    #[serde(default = "default_path")]
    pub path: String,

    /// Whether request overrides are rolled back ("all") or partly kept ("partial")
    #[serde(default)]
    pub restore_overrides: RestorePolicy,
}

fn default_name() -> String {
    "PR-Agent".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_path() -> String {
    "/mcp".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            transport: Transport::default(),
            bind: default_bind(),
            path: default_path(),
            restore_overrides: RestorePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent executable (looked up on PATH)
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before `--pr_url` and the command
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the agent (supports $VAR, ${VAR}, ~)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Extra environment for the agent process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_program() -> String {
    "pr-agent".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }
}

/// Expand environment variables in a path string
/// Supports: $VAR, ${VAR}, ~
pub fn expand_path(path: &str) -> PathBuf {
    let mut result = path.to_string();

    if result.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            result = format!("{}{}", home.display(), &result[1..]);
        }
    } else if result == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    let expanded = ENV_REFERENCE.replace_all(&result, |caps: &Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    PathBuf::from(expanded.to_string())
}

/// Overlay built from the agent environment variables that are set and non-empty.
pub fn agent_env_overlay(lookup: impl Fn(&str) -> Option<String>) -> SettingsOverlay {
    AGENT_ENV_VARS
        .iter()
        .fold(SettingsOverlay::new(), |overlay, (key, vars)| {
            let value = vars
                .iter()
                .find_map(|var| lookup(var).filter(|v| !v.is_empty()));
            match value {
                Some(value) => overlay.set(*key, value),
                None => overlay,
            }
        })
}

/// Settings keys whose values should never be printed.
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    let name = key.rsplit('.').next().unwrap_or(&key);
    name == "key"
        || name.ends_with("_key")
        || name.contains("token")
        || name.contains("secret")
        || name.contains("password")
}

pub fn mask(value: &str) -> String {
    if value.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", value.chars().take(4).collect::<String>())
    }
}

impl Config {
    /// Layered sources: defaults, then the TOML file, then `PAM_` environment variables.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Config::default()));

        let figment = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                figment.merge(Toml::file(path))
            }
            // The default file is optional
            None => match Self::config_path() {
                Ok(default_path) => figment.merge(Toml::file(default_path)),
                Err(_) => figment,
            },
        };

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::figment(path)?
            .extract()
            .context("Failed to load configuration")?;
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("pr-agent-mcp"))
    }

    /// Settings every request starts from: config tables, then agent environment variables.
    pub fn baseline_settings(&self) -> Settings {
        Settings::from_sections(&self.settings)
            .apply(&agent_env_overlay(|var| std::env::var(var).ok()))
    }

    pub fn build_agent(&self) -> ProcessAgent {
        let mut agent = ProcessAgent::new(&self.agent.program).with_args(self.agent.args.clone());
        if let Some(dir) = &self.agent.working_dir {
            agent = agent.with_working_dir(expand_path(dir));
        }
        for (key, value) in &self.agent.env {
            agent = agent.with_env(key, value);
        }
        agent
    }

    /// Copy with secret-looking settings and agent env values masked.
    pub fn redacted(&self) -> Config {
        let mut config = self.clone();
        for (section, entries) in config.settings.iter_mut() {
            for (key, value) in entries.iter_mut() {
                if is_secret_key(&format!("{}.{}", section, key)) {
                    *value = SettingValue::Text(mask(&value.to_string()));
                }
            }
        }
        for (key, value) in config.agent.env.iter_mut() {
            if is_secret_key(key) {
                *value = mask(value);
            }
        }
        config
    }
}
