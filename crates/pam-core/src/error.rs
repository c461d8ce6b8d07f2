use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to start agent: {0}")]
    Spawn(String),

    #[error("Agent exited with {}: {stderr}", exit_label(*.code))]
    Process { code: Option<i32>, stderr: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Agent error: {0}")]
    Agent(String),
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no exit status (terminated by signal)".to_string(),
    }
}

impl Error {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn spawn(message: impl Into<String>) -> Self {
        Self::Spawn(message.into())
    }

    pub fn process(code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::Process {
            code,
            stderr: stderr.into(),
        }
    }

    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent(message.into())
    }

    /// True when the agent ran but reported failure, as opposed to never starting.
    pub fn is_agent_failure(&self) -> bool {
        matches!(self, Error::Process { .. } | Error::Agent(_))
    }

    /// Message without the variant label, as shown to clients.
    pub fn detail(&self) -> String {
        match self {
            Error::InvalidRequest(message)
            | Error::Spawn(message)
            | Error::Io(message)
            | Error::Agent(message) => message.clone(),
            Error::Process { code, stderr } if stderr.is_empty() => {
                format!("agent exited with {}", exit_label(*code))
            }
            Error::Process { stderr, .. } => stderr.clone(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
