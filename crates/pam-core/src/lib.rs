//! pam-core: Core types and request dispatch for pr-agent-mcp
//!
//! This crate provides the operations the server exposes, the settings
//! overlays they apply, and the dispatcher that forwards requests to an
//! external review agent.

pub mod agent;
pub mod dispatcher;
pub mod error;
pub mod operation;
pub mod progress;
pub mod sections;
pub mod settings;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{AgentRequest, ReviewAgent};
pub use dispatcher::Dispatcher;
pub use error::Error;
pub use operation::{Operation, OperationRequest};
pub use progress::{NoProgress, ProgressReporter};
pub use sections::{extract_bug_sections, format_bug_report};
pub use settings::{keys, RestorePolicy, SettingValue, Settings, SettingsOverlay};

pub type Result<T> = std::result::Result<T, Error>;
