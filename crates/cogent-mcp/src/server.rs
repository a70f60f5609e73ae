// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! A single spawned MCP-stdio child server: the handshake, and a
//! request/response cycle serialized by a per-child lock (spec.md §4.5 —
//! "blocking tools/call", "no auto-restart").
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::{McpServerConfig, Notification, RemoteToolDescriptor, Request, Response, ToolsListResult};

pub struct McpServer {
    pub name: String,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    next_id: AtomicU64,
}

impl McpServer {
    /// Spawns the child, performs `initialize` → `notifications/initialized`
    /// → `tools/list`, and returns the server together with the tools it
    /// advertised.
    pub async fn spawn(cfg: &McpServerConfig) -> anyhow::Result<(Self, Vec<RemoteToolDescriptor>)> {
        let mut cmd = Command::new(&cfg.command);
        cmd.args(&cfg.args)
            .envs(&cfg.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| anyhow::anyhow!("failed to spawn MCP server '{}': {e}", cfg.name))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow::anyhow!("no stdin for MCP server '{}'", cfg.name))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow::anyhow!("no stdout for MCP server '{}'", cfg.name))?;

        let server = Self {
            name: cfg.name.clone(),
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            next_id: AtomicU64::new(1),
        };

        server.initialize().await?;
        let tools = server.list_tools().await?;
        debug!(server = %server.name, tool_count = tools.len(), "MCP server ready");
        Ok((server, tools))
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        let params = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "cogent", "version": "1.0.0" },
        });
        self.request("initialize", params).await?;
        self.notify("notifications/initialized", json!({})).await?;
        Ok(())
    }

    async fn list_tools(&self) -> anyhow::Result<Vec<RemoteToolDescriptor>> {
        let result = self.request("tools/list", json!({})).await?;
        let parsed: ToolsListResult = serde_json::from_value(result)?;
        Ok(parsed.tools)
    }

    /// Invokes `tools/call` for `tool_name` and returns the raw `result`
    /// value, or a human-readable error string.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value, String> {
        let params = json!({ "name": tool_name, "arguments": arguments });
        self.request("tools/call", params).await.map_err(|e| e.to_string())
    }

    async fn request(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = Request { jsonrpc: "2.0", id, method, params };
        let mut line = serde_json::to_string(&req)?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await?;
        }

        let mut stdout = self.stdout.lock().await;
        loop {
            let mut buf = String::new();
            let n = stdout.read_line(&mut buf).await?;
            if n == 0 {
                anyhow::bail!("MCP server '{}' closed stdout", self.name);
            }
            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            let resp: Response = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    warn!(server = %self.name, error = %e, line = %trimmed, "ignoring unparsable line on MCP stdout");
                    continue;
                }
            };
            // Server-to-client notifications carry a `method` and no `id` —
            // not a reply to our request, keep reading.
            if resp.method.is_some() && resp.id.is_none() {
                continue;
            }
            if resp.id != Some(id) {
                continue;
            }
            if let Some(err) = resp.error {
                anyhow::bail!("MCP error {}: {}", err.code, err.message);
            }
            return Ok(resp.result.unwrap_or(Value::Null));
        }
    }

    async fn notify(&self, method: &str, params: Value) -> anyhow::Result<()> {
        let note = Notification { jsonrpc: "2.0", method, params };
        let mut line = serde_json::to_string(&note)?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Closes stdin so a well-behaved server sees EOF and exits on its own;
    /// kills it if it hasn't exited within two seconds.
    pub async fn shutdown(&self) {
        {
            let mut stdin = self.stdin.lock().await;
            let _ = stdin.shutdown().await;
        }
        let mut child = self.child.lock().await;
        if tokio::time::timeout(std::time::Duration::from_secs(2), child.wait()).await.is_err() {
            let _ = child.kill().await;
        }
    }
}
