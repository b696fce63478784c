//! Configuration management for the Salesforce MCP Server
//!
//! Handles paths, environment variables, and configuration loading.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ConfigError, Result, SalesforceMcpError};

/// How the guided case flow asks the user for input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Ask through the MCP client with `elicitation/create`
    Elicitation,

    /// Ask on the controlling terminal
    Terminal,
}

impl FromStr for PromptMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elicitation" => Ok(PromptMode::Elicitation),
            "terminal" | "tty" => Ok(PromptMode::Terminal),
            _ => Err(ConfigError::InvalidValue {
                var: "SALESFORCE_PROMPT_MODE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for the Salesforce MCP Server
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for storing configuration files
    pub config_dir: PathBuf,

    /// Path to stored credentials (access/refresh tokens and instance URL)
    pub credentials_path: PathBuf,

    /// Login host, e.g. https://login.salesforce.com or https://test.salesforce.com
    pub login_url: String,

    /// REST API version, e.g. v59.0
    pub api_version: String,

    /// Connected app consumer key
    pub client_id: Option<String>,

    /// Connected app consumer secret
    pub client_secret: Option<String>,

    /// Username for the password grant
    pub username: Option<String>,

    /// Password for the password grant
    pub password: Option<String>,

    /// Security token appended to the password
    pub security_token: Option<String>,

    /// OAuth callback URL
    pub oauth_callback_url: String,

    /// OAuth callback port
    pub oauth_callback_port: u16,

    /// OAuth scopes requested by the interactive flow
    pub scopes: Vec<String>,

    /// How the guided case flow prompts the user
    pub prompt_mode: PromptMode,
}

impl Config {
    /// Create a new configuration from the environment
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;

        let credentials_path = std::env::var("SALESFORCE_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir.join("credentials.json"));

        let login_url = std::env::var("SALESFORCE_LOGIN_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| salesforce::DEFAULT_LOGIN_URL.to_string());

        let api_version = std::env::var("SALESFORCE_API_VERSION")
            .map(|v| normalize_api_version(&v))
            .unwrap_or_else(|_| salesforce::DEFAULT_API_VERSION.to_string());

        let oauth_callback_port = std::env::var("SALESFORCE_OAUTH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let oauth_callback_url = format!("http://localhost:{}/oauth2callback", oauth_callback_port);

        let prompt_mode = match std::env::var("SALESFORCE_PROMPT_MODE") {
            Ok(mode) => mode.parse().map_err(SalesforceMcpError::Config)?,
            Err(_) => PromptMode::Elicitation,
        };

        Ok(Self {
            config_dir,
            credentials_path,
            login_url,
            api_version,
            client_id: non_empty_env("SALESFORCE_CLIENT_ID"),
            client_secret: non_empty_env("SALESFORCE_CLIENT_SECRET"),
            username: non_empty_env("SALESFORCE_USERNAME"),
            password: non_empty_env("SALESFORCE_PASSWORD"),
            security_token: non_empty_env("SALESFORCE_SECURITY_TOKEN"),
            oauth_callback_url,
            oauth_callback_port,
            scopes: vec!["api".to_string(), "refresh_token".to_string()],
            prompt_mode,
        })
    }

    /// Get the configuration directory, creating it if necessary
    fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::home_dir()
            .ok_or_else(|| {
                SalesforceMcpError::Config(ConfigError::DirNotFound {
                    path: "~".to_string(),
                })
            })?
            .join(".salesforce-mcp");

        if !config_dir.exists() {
            std::fs::create_dir_all(&config_dir).map_err(|_| {
                SalesforceMcpError::Config(ConfigError::DirCreationFailed {
                    path: config_dir.display().to_string(),
                })
            })?;
        }

        Ok(config_dir)
    }

    /// Check if credentials (tokens) exist
    pub fn credentials_exist(&self) -> bool {
        self.credentials_path.exists()
    }

    /// Check if username/password login is configured
    pub fn has_password_login(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// OAuth token endpoint on the login host
    pub fn token_url(&self) -> String {
        format!("{}/services/oauth2/token", self.login_url)
    }

    /// OAuth authorize endpoint on the login host
    pub fn authorize_url(&self) -> String {
        format!("{}/services/oauth2/authorize", self.login_url)
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Accept both `59.0` and `v59.0`
fn normalize_api_version(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with('v') {
        raw.to_string()
    } else {
        format!("v{}", raw)
    }
}

/// Salesforce constants
pub mod salesforce {
    /// Default OAuth login host
    pub const DEFAULT_LOGIN_URL: &str = "https://login.salesforce.com";

    /// Default REST API version
    pub const DEFAULT_API_VERSION: &str = "v59.0";

    /// Maximum records per sObject Collections request
    pub const COLLECTION_CHUNK_SIZE: usize = 200;

    /// Default number of accounts returned by a name search
    pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

    /// Standard object names used by the case tools
    pub mod objects {
        pub const CASE: &str = "Case";
        pub const ACCOUNT: &str = "Account";
        pub const CONTACT: &str = "Contact";
    }

    /// Case fields the guided flow fills in explicitly
    pub mod case_fields {
        pub const ACCOUNT_ID: &str = "AccountId";
        pub const CONTACT_ID: &str = "ContactId";
        pub const SUPPLIED_EMAIL: &str = "SuppliedEmail";
        pub const SUPPLIED_NAME: &str = "SuppliedName";
        pub const SUBJECT: &str = "Subject";
        pub const DESCRIPTION: &str = "Description";
        pub const ORIGIN: &str = "Origin";
        pub const STATUS: &str = "Status";
        pub const PRIORITY: &str = "Priority";
        pub const TYPE: &str = "Type";
        pub const CASE_NUMBER: &str = "CaseNumber";

        /// Picklists reported by the case metadata tool
        pub const METADATA_PICKLISTS: [&str; 4] = [PRIORITY, STATUS, TYPE, ORIGIN];

        /// Picklists the guided flow always asks for, in order
        pub const FLOW_PICKLISTS: [&str; 3] = [ORIGIN, STATUS, PRIORITY];
    }
}
