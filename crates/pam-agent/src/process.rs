//! Review agent backed by the PR-Agent command-line tool.
//!
//! Each request spawns `<program> <args...> --pr_url=<url> <command...>`. Settings
//! are passed through the environment as `SECTION.KEY` variables so credentials
//! never appear on the command line.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use pam_core::{AgentRequest, Error, ReviewAgent, Settings};

const DEFAULT_PROGRAM: &str = "pr-agent";

/// Maximum stderr lines kept in an error.
const STDERR_TAIL_LINES: usize = 20;

pub struct ProcessAgent {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl ProcessAgent {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn build_command(&self, request: &AgentRequest) -> Result<Command, Error> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(format!("--pr_url={}", request.url))
            .args(command_words(&request.command)?)
            .envs(settings_env(&request.settings))
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        Ok(command)
    }
}

impl Default for ProcessAgent {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

#[async_trait]
impl ReviewAgent for ProcessAgent {
    fn name(&self) -> &str {
        &self.program
    }

    async fn handle_request(&self, request: AgentRequest) -> Result<Option<String>, Error> {
        let mut command = self.build_command(&request)?;
        info!(
            program = %self.program,
            url = %request.url,
            command = %request.command,
            settings = request.settings.len(),
            "Spawning review agent"
        );

        let output = command
            .output()
            .await
            .map_err(|e| Error::spawn(format!("{}: {}", self.program, e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            warn!(
                program = %self.program,
                exit_code = ?output.status.code(),
                "Review agent failed"
            );
            return Err(Error::process(output.status.code(), stderr_tail(&stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = stdout.trim();
        debug!(
            stdout_len = text.len(),
            stderr_len = stderr.len(),
            "Review agent finished"
        );

        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text.to_string()))
        }
    }
}

/// Split `/ask What changed?` into `["ask", "What changed?"]`.
fn command_words(command: &str) -> Result<Vec<String>, Error> {
    let command = command.trim().trim_start_matches('/');
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim())),
        None => (command, None),
    };

    if name.is_empty() {
        return Err(Error::invalid_request("agent command must not be empty"));
    }

    let mut words = vec![name.to_string()];
    if let Some(rest) = rest.filter(|r| !r.is_empty()) {
        words.push(rest.to_string());
    }
    Ok(words)
}

/// Environment variable name for a dotted settings key.
pub fn env_var_name(key: &str) -> String {
    key.to_ascii_uppercase()
}

pub fn settings_env(settings: &Settings) -> Vec<(String, String)> {
    settings
        .iter()
        .map(|(key, value)| (env_var_name(key), value.to_string()))
        .collect()
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pam_core::keys;
    use std::ffi::OsStr;

    fn request(command: &str, settings: Settings) -> AgentRequest {
        AgentRequest::new("https://github.com/org/repo/pull/42", command, settings)
    }

    #[test]
    fn test_command_words() {
        assert_eq!(command_words("/review").unwrap(), vec!["review"]);
        assert_eq!(
            command_words("/ask What does this change?").unwrap(),
            vec!["ask", "What does this change?"]
        );
        assert_eq!(command_words("describe ").unwrap(), vec!["describe"]);
        assert!(command_words("/").is_err());
    }

    #[test]
    fn test_settings_env() {
        let settings = Settings::new()
            .with(keys::EXTRA_INSTRUCTIONS, "Focus on bugs")
            .with(keys::REQUIRE_SECURITY_REVIEW, true);
        let env = settings_env(&settings);
        assert!(env.contains(&(
            "PR_REVIEWER.EXTRA_INSTRUCTIONS".to_string(),
            "Focus on bugs".to_string()
        )));
        assert!(env.contains(&(
            "PR_REVIEWER.REQUIRE_SECURITY_REVIEW".to_string(),
            "true".to_string()
        )));
    }

    #[test]
    fn test_build_command() {
        let agent = ProcessAgent::new("pr-agent")
            .with_args(["--verbose"])
            .with_env("PYTHONUNBUFFERED", "1");
        let settings = Settings::new().with(keys::OPENAI_KEY, "sk-test");
        let command = agent.build_command(&request("/review", settings)).unwrap();
        let inner = command.as_std();

        assert_eq!(inner.get_program(), OsStr::new("pr-agent"));
        let args: Vec<&OsStr> = inner.get_args().collect();
        assert_eq!(
            args,
            vec![
                OsStr::new("--verbose"),
                OsStr::new("--pr_url=https://github.com/org/repo/pull/42"),
                OsStr::new("review"),
            ]
        );
        assert!(!args.iter().any(|a| a.to_string_lossy().contains("sk-test")));

        let envs: Vec<(&OsStr, Option<&OsStr>)> = inner.get_envs().collect();
        assert!(envs.contains(&(OsStr::new("OPENAI.KEY"), Some(OsStr::new("sk-test")))));
        assert!(envs.contains(&(OsStr::new("PYTHONUNBUFFERED"), Some(OsStr::new("1")))));
    }

    #[test]
    fn test_stderr_tail() {
        let stderr: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[cfg(unix)]
    fn shell(script: &str) -> ProcessAgent {
        ProcessAgent::new("sh").with_args(["-c", script, "pam-agent"])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_returns_stdout() {
        let agent = shell(r#"printf '  %s %s\n' "$1" "$2""#);
        let output = agent
            .handle_request(request("/describe", Settings::new()))
            .await
            .unwrap();
        assert_eq!(
            output.as_deref(),
            Some("--pr_url=https://github.com/org/repo/pull/42 describe")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_blank_stdout_is_none() {
        let agent = shell("echo '   '");
        let output = agent
            .handle_request(request("/review", Settings::new()))
            .await
            .unwrap();
        assert_eq!(output, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let agent = shell("echo 'invalid token' >&2; exit 3");
        let err = agent
            .handle_request(request("/review", Settings::new()))
            .await
            .unwrap_err();
        match err {
            Error::Process { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "invalid token");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let agent = ProcessAgent::new("pam-agent-definitely-missing-binary");
        let err = agent
            .handle_request(request("/review", Settings::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn(_)));
    }
}
