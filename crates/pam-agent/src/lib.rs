//! pam-agent: review agent implementations for pr-agent-mcp
//!
//! This crate provides implementations of the ReviewAgent trait.

pub mod process;

pub use process::ProcessAgent;
