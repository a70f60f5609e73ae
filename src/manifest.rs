// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Parses the external tools manifest (spec.md §4.4/§6): a JSON object keyed
//! by tool name, each value a `ToolDefinition` record with a mandatory
//! `type` (`internal` | `command` | `jsonrpc` | `mcp-stdio`), `description`,
//! and `parameters`, plus per-type fields.
//!
//! `internal` entries exist only to override metadata on a built-in tool
//! (not currently read — built-ins are hard-coded, see spec.md §4.3) and are
//! otherwise ignored here. `mcp-stdio` entries additionally carry the launch
//! spec (`command`/`args`/`env`) for the server that owns them, since the
//! manifest is the only place a server's command line is declared; entries
//! sharing a `server` name are expected to agree, and the first one seen
//! wins.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use cogent_mcp::McpServerConfig;
use cogent_tools::{CommandToolDefinition, JsonRpcToolDefinition};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct RawToolDefinition {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    #[allow(dead_code)]
    description: String,
    #[serde(default)]
    #[allow(dead_code)]
    parameters: serde_json::Value,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    preview_command: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    server: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Everything discovered in the manifest, ready to wire into a
/// [`cogent_tools::ToolExecutor`] and an [`cogent_mcp::McpSupervisor`].
#[derive(Debug, Default)]
pub struct Manifest {
    pub command_tools: Vec<CommandToolDefinition>,
    pub jsonrpc_tools: Vec<JsonRpcToolDefinition>,
    pub mcp_servers: Vec<McpServerConfig>,
}

/// Resolves the manifest path: `MCP_TOOLS_CONF_PATH` env var if set,
/// otherwise `mcp_tools.json` in the current working directory.
pub fn resolve_path() -> PathBuf {
    std::env::var("MCP_TOOLS_CONF_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("mcp_tools.json"))
}

/// Loads and parses the manifest at `path`. A missing file is not an error —
/// most deployments never define external tools — and yields an empty
/// manifest. `default_timeout_secs` fills in `timeout_secs` for `command`
/// entries that omit it.
pub fn load(path: &Path, default_timeout_secs: u64) -> anyhow::Result<Manifest> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Manifest::default()),
        Err(e) => return Err(e).with_context(|| format!("reading tools manifest {}", path.display())),
    };
    let raw: HashMap<String, RawToolDefinition> = serde_json::from_str(&text)
        .with_context(|| format!("parsing tools manifest {}", path.display()))?;

    let mut manifest = Manifest::default();
    let mut seen_servers: HashMap<String, ()> = HashMap::new();

    for (name, def) in raw {
        match def.kind.as_str() {
            "internal" => {}
            "command" => {
                let Some(command) = def.command else {
                    warn!(tool = %name, "command tool definition missing `command`, skipping");
                    continue;
                };
                manifest.command_tools.push(CommandToolDefinition {
                    name,
                    command,
                    preview_command: def.preview_command,
                    timeout_secs: def.timeout_secs.unwrap_or(default_timeout_secs),
                });
            }
            "jsonrpc" => {
                let Some(url) = def.url else {
                    warn!(tool = %name, "jsonrpc tool definition missing `url`, skipping");
                    continue;
                };
                manifest.jsonrpc_tools.push(JsonRpcToolDefinition { name, url });
            }
            "mcp-stdio" => {
                let Some(server) = def.server else {
                    warn!(tool = %name, "mcp-stdio tool definition missing `server`, skipping");
                    continue;
                };
                let Some(command) = def.command else {
                    warn!(tool = %name, server = %server, "mcp-stdio tool definition missing `command`, skipping");
                    continue;
                };
                if seen_servers.insert(server.clone(), ()).is_none() {
                    manifest.mcp_servers.push(McpServerConfig {
                        name: server,
                        command,
                        args: def.args,
                        env: def.env,
                    });
                }
            }
            other => warn!(tool = %name, kind = other, "unknown tool definition type, skipping"),
        }
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_is_empty_not_an_error() {
        let m = load(Path::new("/nonexistent/mcp_tools.json"), 30).unwrap();
        assert!(m.command_tools.is_empty());
        assert!(m.jsonrpc_tools.is_empty());
        assert!(m.mcp_servers.is_empty());
    }

    #[test]
    fn parses_command_and_jsonrpc_and_mcp_stdio_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_tools.json");
        std::fs::write(
            &path,
            r#"{
                "run_lint": {
                    "type": "command",
                    "description": "lint a file",
                    "parameters": {"type": "object"},
                    "command": "eslint {file}"
                },
                "call_ticket_api": {
                    "type": "jsonrpc",
                    "description": "look up a ticket",
                    "parameters": {"type": "object"},
                    "url": "http://localhost:9000/rpc"
                },
                "read_wiki": {
                    "type": "mcp-stdio",
                    "description": "read a wiki page",
                    "parameters": {"type": "object"},
                    "server": "wiki-server",
                    "command": "npx",
                    "args": ["-y", "wiki-mcp-server"]
                }
            }"#,
        )
        .unwrap();

        let m = load(&path, 30).unwrap();
        assert_eq!(m.command_tools.len(), 1);
        assert_eq!(m.command_tools[0].name, "run_lint");
        assert_eq!(m.command_tools[0].timeout_secs, 30);
        assert_eq!(m.jsonrpc_tools.len(), 1);
        assert_eq!(m.jsonrpc_tools[0].url, "http://localhost:9000/rpc");
        assert_eq!(m.mcp_servers.len(), 1);
        assert_eq!(m.mcp_servers[0].name, "wiki-server");
        assert_eq!(m.mcp_servers[0].command, "npx");
    }

    #[test]
    fn duplicate_server_name_keeps_first_launch_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_tools.json");
        std::fs::write(
            &path,
            r#"{
                "tool_a": {
                    "type": "mcp-stdio", "description": "a", "parameters": {},
                    "server": "srv", "command": "first"
                },
                "tool_b": {
                    "type": "mcp-stdio", "description": "b", "parameters": {},
                    "server": "srv", "command": "second"
                }
            }"#,
        )
        .unwrap();
        let m = load(&path, 30).unwrap();
        assert_eq!(m.mcp_servers.len(), 1);
    }

    #[test]
    fn unknown_type_is_skipped_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_tools.json");
        std::fs::write(&path, r#"{"weird": {"type": "bogus", "description": "", "parameters": {}}}"#).unwrap();
        let m = load(&path, 30).unwrap();
        assert!(m.command_tools.is_empty());
    }
}
