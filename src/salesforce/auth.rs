//! OAuth authentication for the Salesforce REST API
//!
//! Handles:
//! - Username/password login (OAuth password grant)
//! - Interactive browser-based authentication (authorization code grant)
//! - Token storage and refresh

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{AuthError, Result, SalesforceMcpError};

/// An authenticated session: bearer token plus the org's instance URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub instance_url: String,
}

/// Stored credentials from the interactive flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// Access token
    pub access_token: String,

    /// Refresh token
    pub refresh_token: Option<String>,

    /// Org instance URL
    pub instance_url: String,

    /// Identity URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Issued-at timestamp (epoch millis, as a string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
}

/// Token response from the OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    instance_url: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    issued_at: Option<String>,
}

/// OAuth error body
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth authenticator
pub struct Authenticator {
    /// Configuration
    config: Config,

    /// HTTP client
    http_client: reqwest::Client,

    /// Credentials loaded from disk, if any
    credentials: Arc<RwLock<Option<StoredCredentials>>>,

    /// Current session
    session: Arc<RwLock<Option<Session>>>,
}

impl Authenticator {
    /// Create a new authenticator
    pub async fn new(config: Config) -> Result<Self> {
        let auth = Self {
            config,
            http_client: reqwest::Client::new(),
            credentials: Arc::new(RwLock::new(None)),
            session: Arc::new(RwLock::new(None)),
        };

        if auth.config.credentials_exist() {
            match auth.load_credentials().await {
                Ok(creds) => *auth.credentials.write().await = Some(creds),
                Err(e) => tracing::warn!("Ignoring unreadable credentials file: {}", e),
            }
        }

        Ok(auth)
    }

    /// Load stored credentials from file
    async fn load_credentials(&self) -> Result<StoredCredentials> {
        let content = tokio::fs::read_to_string(&self.config.credentials_path).await?;
        let creds: StoredCredentials = serde_json::from_str(&content)?;
        Ok(creds)
    }

    /// Save credentials to file
    async fn save_credentials(&self, credentials: &StoredCredentials) -> Result<()> {
        let content = serde_json::to_string_pretty(credentials)?;
        tokio::fs::write(&self.config.credentials_path, content).await?;
        Ok(())
    }

    /// Whether a session can be established without user interaction
    pub async fn can_authenticate(&self) -> bool {
        self.config.has_password_login() || self.has_refresh_token().await
    }

    /// Get the current session, logging in if there is none
    pub async fn session(&self) -> Result<Session> {
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }

        let session = if self.config.has_password_login() {
            self.password_login().await?
        } else if self.has_refresh_token().await {
            self.refresh_session().await?
        } else {
            return Err(SalesforceMcpError::Auth(AuthError::CredentialsNotFound {
                path: self.config.credentials_path.display().to_string(),
            }));
        };

        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    /// Drop the cached session so the next call logs in again
    pub async fn invalidate(&self) {
        tracing::info!("Salesforce session rejected; clearing cached session");
        *self.session.write().await = None;
    }

    async fn has_refresh_token(&self) -> bool {
        self.credentials
            .read()
            .await
            .as_ref()
            .is_some_and(|c| c.refresh_token.is_some())
    }

    fn client_credentials(&self) -> Result<(&str, &str)> {
        let client_id = self.config.client_id.as_deref().ok_or_else(|| {
            SalesforceMcpError::Auth(AuthError::MissingClientCredentials {
                var: "SALESFORCE_CLIENT_ID".to_string(),
            })
        })?;
        let client_secret = self.config.client_secret.as_deref().ok_or_else(|| {
            SalesforceMcpError::Auth(AuthError::MissingClientCredentials {
                var: "SALESFORCE_CLIENT_SECRET".to_string(),
            })
        })?;
        Ok((client_id, client_secret))
    }

    /// Log in with the OAuth password grant
    async fn password_login(&self) -> Result<Session> {
        let (client_id, client_secret) = self.client_credentials()?;
        let username = self.config.username.as_deref().unwrap_or_default();
        let password = format!(
            "{}{}",
            self.config.password.as_deref().unwrap_or_default(),
            self.config.security_token.as_deref().unwrap_or_default()
        );

        let params = [
            ("grant_type", "password"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("username", username),
            ("password", password.as_str()),
        ];

        tracing::debug!("Logging in to {} as {}", self.config.login_url, username);

        let token = self
            .request_token(&params)
            .await
            .map_err(|message| SalesforceMcpError::Auth(AuthError::LoginFailed { message }))?;

        tracing::info!("Connected to Salesforce instance {}", token.instance_url);

        Ok(Session {
            access_token: token.access_token,
            instance_url: token.instance_url,
        })
    }

    /// Exchange the stored refresh token for a new session
    async fn refresh_session(&self) -> Result<Session> {
        let stored = self.credentials.read().await.clone();
        let stored = stored.ok_or_else(|| {
            SalesforceMcpError::Auth(AuthError::TokenRefreshFailed {
                message: "No stored credentials".to_string(),
            })
        })?;
        let refresh_token = stored.refresh_token.clone().ok_or_else(|| {
            SalesforceMcpError::Auth(AuthError::TokenRefreshFailed {
                message: "No refresh token available".to_string(),
            })
        })?;

        let (client_id, client_secret) = self.client_credentials()?;
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token.as_str()),
        ];

        let token = self.request_token(&params).await.map_err(|message| {
            SalesforceMcpError::Auth(AuthError::TokenRefreshFailed { message })
        })?;

        let updated = StoredCredentials {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.or(Some(refresh_token)),
            instance_url: token.instance_url.clone(),
            id: token.id.or(stored.id),
            issued_at: token.issued_at,
        };
        self.save_credentials(&updated).await?;
        *self.credentials.write().await = Some(updated);

        Ok(Session {
            access_token: token.access_token,
            instance_url: token.instance_url,
        })
    }

    /// POST to the token endpoint; the error side carries the OAuth error text
    async fn request_token(
        &self,
        params: &[(&str, &str)],
    ) -> std::result::Result<TokenResponse, String> {
        let response = self
            .http_client
            .post(self.config.token_url())
            .form(params)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<TokenErrorResponse>(&text) {
                Ok(err) => format!(
                    "{}: {}",
                    err.error,
                    err.error_description.unwrap_or_default()
                ),
                Err(_) => format!("{} {}", status, text),
            });
        }

        response.json().await.map_err(|e| e.to_string())
    }

    /// Generate the authorization URL
    pub fn generate_auth_url(&self) -> Result<String> {
        let (client_id, _) = self.client_credentials()?;
        let scopes = self.config.scopes.join(" ");
        Ok(format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&prompt=login%20consent",
            self.config.authorize_url(),
            urlencoding::encode(client_id),
            urlencoding::encode(&self.config.oauth_callback_url),
            urlencoding::encode(&scopes)
        ))
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> Result<StoredCredentials> {
        let (client_id, client_secret) = self.client_credentials()?;
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("redirect_uri", self.config.oauth_callback_url.as_str()),
        ];

        let token = self.request_token(&params).await.map_err(|message| {
            SalesforceMcpError::Auth(AuthError::TokenExchangeFailed { message })
        })?;

        let credentials = StoredCredentials {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token,
            instance_url: token.instance_url.clone(),
            id: token.id,
            issued_at: token.issued_at,
        };

        self.save_credentials(&credentials).await?;
        *self.credentials.write().await = Some(credentials.clone());
        *self.session.write().await = Some(Session {
            access_token: token.access_token,
            instance_url: token.instance_url,
        });

        Ok(credentials)
    }

    /// Run interactive authentication flow with local HTTP server
    pub async fn authenticate_interactive(&self) -> Result<()> {
        use axum::{extract::Query, response::Html, routing::get, Router};
        use std::collections::HashMap;
        use tokio::sync::oneshot;

        let auth_url = self.generate_auth_url()?;
        eprintln!("\nPlease visit this URL to authenticate:");
        eprintln!("{}\n", auth_url);

        if let Err(e) = open::that(&auth_url) {
            eprintln!("Could not open browser automatically: {}", e);
            eprintln!("Please open the URL manually.");
        }

        let (tx, rx) = oneshot::channel::<String>();
        let tx = Arc::new(std::sync::Mutex::new(Some(tx)));

        let tx_clone = tx.clone();
        let callback_handler = move |Query(params): Query<HashMap<String, String>>| async move {
            match params.get("code") {
                Some(code) => {
                    if let Some(tx) = tx_clone.lock().ok().and_then(|mut guard| guard.take()) {
                        let _ = tx.send(code.clone());
                    }
                    Html("<html><body><h1>Authentication successful!</h1><p>You can close this window.</p></body></html>")
                }
                None => Html("<html><body><h1>Authentication failed</h1><p>No authorization code received.</p></body></html>"),
            }
        };

        let app = Router::new().route("/oauth2callback", get(callback_handler));

        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], self.config.oauth_callback_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        eprintln!(
            "Waiting for authentication callback on port {}...",
            self.config.oauth_callback_port
        );

        let server = axum::serve(listener, app);

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    return Err(SalesforceMcpError::Auth(AuthError::CallbackError {
                        message: e.to_string(),
                    }));
                }
            }
            code = rx => {
                match code {
                    Ok(code) => {
                        eprintln!("Received authorization code, exchanging for tokens...");
                        let creds = self.exchange_code(&code).await?;
                        eprintln!("Connected to {}", creds.instance_url);
                    }
                    Err(_) => {
                        return Err(SalesforceMcpError::Auth(AuthError::NoAuthCode));
                    }
                }
            }
        }

        Ok(())
    }
}
