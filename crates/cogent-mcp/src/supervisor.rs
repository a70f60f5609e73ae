// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Owns every configured MCP server and routes `tools/call` requests to the
//! one that advertised the requested tool name.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cogent_tools::McpRouter;
use serde_json::Value;
use tracing::{info, warn};

use crate::protocol::McpServerConfig;
use crate::server::McpServer;

/// Spawns and owns every configured MCP server, and dispatches `tools/call`
/// by looking up which server advertised a given tool name at startup.
/// Implements [`McpRouter`] so a [`cogent_tools::ToolExecutor`] can route
/// unclaimed tool names to it.
pub struct McpSupervisor {
    servers: Vec<Arc<McpServer>>,
    tool_owner: HashMap<String, Arc<McpServer>>,
}

impl McpSupervisor {
    /// Spawns every configured server and performs its handshake. A server
    /// that fails to start is logged and skipped — the agent still runs
    /// with whichever servers did come up.
    pub async fn start(configs: &[McpServerConfig]) -> Self {
        let mut servers = Vec::new();
        let mut tool_owner = HashMap::new();

        for cfg in configs {
            match McpServer::spawn(cfg).await {
                Ok((server, tools)) => {
                    let server = Arc::new(server);
                    for tool in &tools {
                        if tool_owner.contains_key(&tool.name) {
                            warn!(tool = %tool.name, server = %cfg.name, "tool name already claimed by another MCP server; ignoring");
                            continue;
                        }
                        tool_owner.insert(tool.name.clone(), Arc::clone(&server));
                    }
                    info!(server = %cfg.name, tools = tools.len(), "MCP server started");
                    servers.push(server);
                }
                Err(e) => {
                    warn!(server = %cfg.name, error = %e, "failed to start MCP server, skipping");
                }
            }
        }

        Self { servers, tool_owner }
    }

    /// Every tool name owned by some running server, for merging into the
    /// model-facing tool list alongside the built-ins.
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_owner.keys().cloned().collect()
    }

    /// Closes stdin on every server (giving it a chance to exit cleanly)
    /// then kills any that are still alive after a short grace period.
    pub async fn shutdown_all(&self) {
        for server in &self.servers {
            server.shutdown().await;
        }
    }
}

#[async_trait]
impl McpRouter for McpSupervisor {
    async fn call(&self, tool_name: &str, arguments: Value) -> Result<Value, String> {
        let Some(server) = self.tool_owner.get(tool_name) else {
            return Err(format!("no MCP server owns tool: {tool_name}"));
        };
        server.call_tool(tool_name, arguments).await
    }
}
