// SPDX-License-Identifier: MIT
// Stdio transport: one JSON object per line on stdin/stdout. Used when the
// daemon is spawned as a child process by an MCP host.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::sync::Mutex;

use super::Transport;

pub struct StdioTransport {
    reader: Mutex<Lines<BufReader<Stdin>>>,
    writer: Mutex<Stdout>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            writer: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn receive(&self) -> Result<Option<String>> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next_line().await.context("read from stdin")? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => return Ok(Some(line)),
                None => return Ok(None),
            }
        }
    }

    async fn send(&self, frame: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(frame.as_bytes())
            .await
            .context("write to stdout")?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.flush().await;
    }

    fn peer(&self) -> String {
        "stdio".to_string()
    }
}
