//! pam-server: MCP server for pr-agent-mcp
//!
//! Configuration loading, the MCP tool server and the `setup` helper. The
//! binary in `main.rs` wires them to the command line.

pub mod config;
pub mod server;
pub mod setup;
