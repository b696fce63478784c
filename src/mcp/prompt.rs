//! Asking the user for a line of input
//!
//! The guided case flow needs a human in the loop. Over stdio the protocol
//! owns stdin, so the default is MCP elicitation: the server sends an
//! `elicitation/create` request to the client and waits for the answer on the
//! same transport. [`TerminalPrompter`] talks to the controlling TTY instead.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::{FlowAbort, McpError, Result, SalesforceMcpError};
use crate::mcp::transport::Transport;
use crate::mcp::types::{
    methods, ElicitAction, ElicitResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId,
};

/// Field name of the single text input in each elicitation form
const RESPONSE_FIELD: &str = "response";

/// Presents a message and returns one line typed by the user
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn prompt(&self, message: &str) -> Result<String>;
}

/// Prompts through the MCP client using `elicitation/create`
pub struct ElicitationPrompter {
    transport: Arc<Transport>,
    next_id: AtomicU64,
}

impl ElicitationPrompter {
    /// Create a prompter sharing the server's transport
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    fn request(&self, message: &str) -> (String, JsonRpcRequest) {
        let id = format!("elicit-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = JsonRpcRequest::new(
            RequestId::String(id.clone()),
            methods::ELICITATION_CREATE,
            Some(json!({
                "message": message,
                "requestedSchema": {
                    "type": "object",
                    "properties": {
                        RESPONSE_FIELD: {
                            "type": "string",
                            "title": "Response",
                            "description": "Leave blank to skip optional steps"
                        }
                    }
                }
            })),
        );
        (id, request)
    }
}

#[async_trait]
impl Prompter for ElicitationPrompter {
    async fn prompt(&self, message: &str) -> Result<String> {
        let (id, request) = self.request(message);
        self.transport.write_message(&request).await?;

        loop {
            let Some(line) = self.transport.read_message().await? else {
                return Err(SalesforceMcpError::Mcp(McpError::TransportClosed {
                    waiting_for: methods::ELICITATION_CREATE.to_string(),
                }));
            };

            let value: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Ignoring unparseable message while awaiting user input: {}", e);
                    continue;
                }
            };

            // Keep-alive pings may arrive while the user is typing
            if value.get("method").and_then(Value::as_str) == Some(methods::PING) {
                if let Some(ping_id) = value
                    .get("id")
                    .and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok())
                {
                    self.transport
                        .write_message(&JsonRpcResponse::success(ping_id, json!({})))
                        .await?;
                }
                continue;
            }

            // Requests are served one at a time; others are refused until the user answers
            if let Some(method) = value.get("method").and_then(Value::as_str) {
                match value
                    .get("id")
                    .and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok())
                {
                    Some(other_id) => {
                        tracing::warn!("Rejecting {} received while awaiting user input", method);
                        self.transport
                            .write_message(&JsonRpcResponse::error(
                                other_id,
                                JsonRpcError::server_busy(),
                            ))
                            .await?;
                    }
                    None => {
                        tracing::debug!("Ignoring notification {} while awaiting user input", method)
                    }
                }
                continue;
            }

            if value.get("id").and_then(Value::as_str) != Some(id.as_str()) {
                tracing::warn!("Ignoring response to an unknown request while awaiting user input");
                continue;
            }

            if let Some(error) = value.get("error") {
                return Err(SalesforceMcpError::Mcp(McpError::ClientError {
                    method: methods::ELICITATION_CREATE.to_string(),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                }));
            }

            let result: ElicitResult =
                serde_json::from_value(value.get("result").cloned().unwrap_or(Value::Null))?;

            return match result.action {
                ElicitAction::Accept => Ok(result
                    .content
                    .as_ref()
                    .and_then(|c| c.get(RESPONSE_FIELD))
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default()),
                ElicitAction::Decline | ElicitAction::Cancel => {
                    Err(SalesforceMcpError::Flow(FlowAbort::Cancelled))
                }
            };
        }
    }
}

/// Prompts on a terminal device, `/dev/tty` by default
pub struct TerminalPrompter {
    input: PathBuf,
    output: PathBuf,
}

impl TerminalPrompter {
    /// Prompt on the controlling terminal
    pub fn new() -> Self {
        Self::with_paths("/dev/tty", "/dev/tty")
    }

    /// Prompt using separate input and output files
    pub fn with_paths(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn prompt(&self, message: &str) -> Result<String> {
        let mut output = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.output)
            .await?;
        output
            .write_all(format!("{}\n> ", message).as_bytes())
            .await?;
        output.flush().await?;

        let input = tokio::fs::File::open(&self.input).await?;
        let mut line = String::new();
        if BufReader::new(input).read_line(&mut line).await? == 0 {
            return Err(SalesforceMcpError::Flow(FlowAbort::Cancelled));
        }

        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
