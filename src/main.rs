//! Salesforce MCP Server - Rust Implementation
//!
//! A Model Context Protocol (MCP) server for Salesforce.
//! Provides tools for querying and changing records and for guided case creation.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use salesforce_mcp_server_rust::config::{Config, PromptMode};
use salesforce_mcp_server_rust::mcp::prompt::{ElicitationPrompter, Prompter, TerminalPrompter};
use salesforce_mcp_server_rust::mcp::server::McpServer;
use salesforce_mcp_server_rust::mcp::tools::ToolHandler;
use salesforce_mcp_server_rust::mcp::transport::Transport;
use salesforce_mcp_server_rust::salesforce::auth::Authenticator;
use salesforce_mcp_server_rust::salesforce::client::SalesforceClient;
use salesforce_mcp_server_rust::salesforce::connection::Connection;

/// Salesforce MCP Server
#[derive(Parser)]
#[command(name = "salesforce-mcp-server")]
#[command(author, version, about = "Salesforce MCP Server - A Model Context Protocol server for Salesforce")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with Salesforce in the browser (not needed for username/password login)
    Auth {
        /// Custom OAuth callback URL
        #[arg(long)]
        callback_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries protocol messages
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::new().context("Failed to load configuration")?;

    match cli.command {
        Some(Commands::Auth { callback_url }) => {
            if let Some(url) = callback_url {
                config.oauth_callback_url = url;
            }
            let authenticator = Authenticator::new(config).await?;
            authenticator
                .authenticate_interactive()
                .await
                .context("Browser authentication failed")?;
            eprintln!("Authentication completed successfully!");
        }
        None => run_server(config).await?,
    }

    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let api_version = config.api_version.clone();
    let prompt_mode = config.prompt_mode;

    let authenticator = Authenticator::new(config).await?;
    if !authenticator.can_authenticate().await {
        anyhow::bail!(
            "No Salesforce credentials. Set SALESFORCE_USERNAME and SALESFORCE_PASSWORD, \
             or run 'salesforce-mcp-server auth' first."
        );
    }

    let connection: Arc<dyn Connection> =
        Arc::new(SalesforceClient::new(Arc::new(authenticator), api_version));

    let transport = Arc::new(Transport::stdio());
    let prompter: Arc<dyn Prompter> = match prompt_mode {
        PromptMode::Elicitation => Arc::new(ElicitationPrompter::new(transport.clone())),
        PromptMode::Terminal => Arc::new(TerminalPrompter::new()),
    };
    tracing::info!("Prompting users via {:?}", prompt_mode);

    let mut server = McpServer::new(ToolHandler::new(connection, prompter), transport);
    server.run().await.context("MCP server stopped")?;

    Ok(())
}
