//! Salesforce MCP Server Library
//!
//! A Model Context Protocol (MCP) server for Salesforce.
//! Provides tools for querying, changing and creating records via the
//! Salesforce REST API, including a guided, prompt-driven case creation.

pub mod case;
pub mod config;
pub mod error;
pub mod mcp;
pub mod salesforce;

pub use config::Config;
pub use error::{Result, SalesforceMcpError};
