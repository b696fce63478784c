//! MCP (Model Context Protocol) module
//!
//! Implements the MCP server protocol for tool invocation, and asking the
//! user for input while a tool runs.

pub mod prompt;
pub mod server;
pub mod tools;
pub mod transport;
pub mod types;
