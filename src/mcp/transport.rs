//! Line-delimited JSON-RPC transport
//!
//! One JSON message per line. The reader and writer are locked separately so
//! a tool handler can send an elicitation request and wait for its reply on
//! the same channel while the server loop is suspended in that tool call.

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;

use crate::error::Result;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Message transport shared by the server loop and the elicitation prompter
pub struct Transport {
    reader: Mutex<Lines<BufReader<BoxedReader>>>,
    writer: Mutex<BoxedWriter>,
}

impl Transport {
    /// Wrap any reader/writer pair
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        Self {
            reader: Mutex::new(BufReader::new(reader).lines()),
            writer: Mutex::new(writer),
        }
    }

    /// Transport over the process's stdin/stdout
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Next non-blank line, or `None` at end of input
    pub async fn read_message(&self) -> Result<Option<String>> {
        let mut reader = self.reader.lock().await;
        while let Some(line) = reader.next_line().await? {
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    /// Serialize and send one message
    pub async fn write_message<T: Serialize>(&self, message: &T) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}
