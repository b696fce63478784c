//! MCP Server implementation
//!
//! Implements the Model Context Protocol server over a line-delimited
//! transport (stdio in production).

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::mcp::tools::ToolHandler;
use crate::mcp::transport::Transport;
use crate::mcp::types::*;

/// MCP Server info
const SERVER_NAME: &str = "salesforce";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server for Salesforce
pub struct McpServer {
    /// Tool handler
    tool_handler: ToolHandler,

    /// Message transport, shared with the elicitation prompter
    transport: Arc<Transport>,

    /// Whether initialized
    initialized: bool,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(tool_handler: ToolHandler, transport: Arc<Transport>) -> Self {
        Self {
            tool_handler,
            transport,
            initialized: false,
        }
    }

    /// Serve messages until the client closes the transport.
    ///
    /// Messages are handled one at a time. The reader lock is released
    /// between reads, so a tool call can read its elicitation replies.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("MCP server ready");

        while let Some(line) = self.transport.read_message().await? {
            match self.handle_message(&line).await {
                Ok(Some(response)) => self.transport.write_message(&response).await?,
                Ok(None) => {}
                Err(e) => tracing::error!("Error handling message: {}", e),
            }
        }

        tracing::info!("Client disconnected");
        Ok(())
    }

    /// Whether the client has sent `notifications/initialized`
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Handle an incoming JSON-RPC message; notifications produce no response
    pub async fn handle_message(&mut self, message: &str) -> Result<Option<JsonRpcResponse>> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                return Ok(Some(JsonRpcResponse::error_without_id(
                    JsonRpcError::parse_error(e.to_string()),
                )));
            }
        };

        let Some(id) = request.id.clone() else {
            if request.method == methods::INITIALIZED {
                self.initialized = true;
                tracing::debug!("Client initialized");
            } else {
                tracing::debug!("Ignoring notification {}", request.method);
            }
            return Ok(None);
        };

        match request.method.as_str() {
            methods::INITIALIZE => {
                let result = self.handle_initialize(&request)?;
                Ok(Some(JsonRpcResponse::success(id, result)))
            }
            methods::PING => Ok(Some(JsonRpcResponse::success(id, serde_json::json!({})))),
            methods::LIST_TOOLS => {
                let result = self.handle_list_tools()?;
                Ok(Some(JsonRpcResponse::success(id, result)))
            }
            methods::CALL_TOOL => match self.handle_call_tool(&request).await {
                Ok(result) => Ok(Some(JsonRpcResponse::success(id, result))),
                Err(error) => Ok(Some(JsonRpcResponse::error(id, error))),
            },
            _ => Ok(Some(JsonRpcResponse::error(
                id,
                JsonRpcError::method_not_found(&request.method),
            ))),
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, request: &JsonRpcRequest) -> Result<Value> {
        let params: Option<InitializeParams> = request
            .params
            .as_ref()
            .and_then(|p| serde_json::from_value(p.clone()).ok());

        let protocol_version = match params.as_ref() {
            Some(p) if SUPPORTED_VERSIONS.contains(&p.protocol_version.as_str()) => {
                p.protocol_version.clone()
            }
            _ => MCP_VERSION.to_string(),
        };

        match params.as_ref() {
            Some(p) => {
                if let Some(client) = &p.client_info {
                    tracing::info!("Client: {} {}", client.name, client.version);
                }
                if p.capabilities.elicitation.is_none() {
                    tracing::warn!(
                        "Client did not advertise elicitation; guided case creation may fail"
                    );
                }
            }
            None => tracing::warn!("initialize request without readable params"),
        }

        let result = InitializeResult {
            protocol_version,
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {}),
            },
        };

        Ok(serde_json::to_value(result)?)
    }

    /// Handle list tools request
    fn handle_list_tools(&self) -> Result<Value> {
        let result = ListToolsResult {
            tools: self.tool_handler.list_tools(),
        };

        Ok(serde_json::to_value(result)?)
    }

    /// Handle call tool request
    async fn handle_call_tool(
        &self,
        request: &JsonRpcRequest,
    ) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = match request.params.as_ref() {
            Some(p) => serde_json::from_value(p.clone()).map_err(|e| {
                JsonRpcError::invalid_params(format!("Invalid tool parameters: {}", e))
            })?,
            None => return Err(JsonRpcError::invalid_params("Missing tool parameters")),
        };

        let result = self
            .tool_handler
            .call_tool(&params.name, params.arguments)
            .await;
        serde_json::to_value(result).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
    }
}
