//! Error types for the Salesforce MCP Server
//!
//! This module defines the error hierarchy for all operations in the server.
//! Every tool handler returns [`Result`], and the dispatcher renders any error
//! as an `isError` tool result.

use thiserror::Error;

/// Main error type for the Salesforce MCP Server
#[derive(Error, Debug)]
pub enum SalesforceMcpError {
    /// OAuth authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Salesforce REST API errors
    #[error("Salesforce API error: {0}")]
    Salesforce(#[from] SalesforceApiError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Guided case creation was aborted
    #[error("Case creation aborted: {0}")]
    Flow(#[from] FlowAbort),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// OAuth authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No Salesforce credentials available: set SALESFORCE_USERNAME/SALESFORCE_PASSWORD or run 'salesforce-mcp-server auth' (looked for {path})")]
    CredentialsNotFound { path: String },

    #[error("Missing connected app credentials: {var} is not set")]
    MissingClientCredentials { var: String },

    #[error("Login failed: {message}")]
    LoginFailed { message: String },

    #[error("Failed to refresh access token: {message}")]
    TokenRefreshFailed { message: String },

    #[error("OAuth callback error: {message}")]
    CallbackError { message: String },

    #[error("No authorization code provided")]
    NoAuthCode,

    #[error("Token exchange failed: {message}")]
    TokenExchangeFailed { message: String },

    #[error("Session expired or invalid; it will be re-established on the next call")]
    SessionExpired,
}

/// Salesforce REST API errors
#[derive(Error, Debug)]
pub enum SalesforceApiError {
    #[error("{object} record not found: {id}")]
    RecordNotFound { object: String, id: String },

    #[error("Field {field} not found on {object}")]
    FieldNotFound { object: String, field: String },

    #[error("Field {field} on {object} is not a picklist")]
    NotAPicklist { object: String, field: String },

    #[error("Failed to save {object}: {message}")]
    SaveFailed { object: String, message: String },

    #[error("Request failed ({status}){}: {message}", code_suffix(.error_code))]
    RequestFailed {
        status: u16,
        error_code: Option<String>,
        message: String,
    },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" [{}]", c))
        .unwrap_or_default()
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found: {path}")]
    DirNotFound { path: String },

    #[error("Failed to create config directory: {path}")]
    DirCreationFailed { path: String },

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid parameter: {name} - {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Invalid identifier '{name}': only letters, digits, '_' and '.' are allowed")]
    InvalidIdentifier { name: String },
}

/// Conditions that unwind the guided case creation flow.
///
/// None of these are retried; all input gathered so far is discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowAbort {
    #[error("invalid selection '{input}': expected a number between 1 and {max}")]
    InvalidSelection { input: String, max: usize },

    #[error("no {object} records found matching '{term}'")]
    NoMatches { object: String, term: String },

    #[error("'{input}' is not a valid number for {field}")]
    InvalidNumber { field: String, input: String },

    #[error("case creation was not confirmed")]
    Declined,

    #[error("the user cancelled the request")]
    Cancelled,
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },

    #[error("Client returned an error for {method}: {message}")]
    ClientError { method: String, message: String },

    #[error("Transport closed while waiting for {waiting_for}")]
    TransportClosed { waiting_for: String },
}

/// Result type alias for Salesforce MCP operations
pub type Result<T> = std::result::Result<T, SalesforceMcpError>;
