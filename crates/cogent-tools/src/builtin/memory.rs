// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{ApprovalPolicy, Tool, ToolCall, ToolOutput};

/// Reads or appends to a project-local memory file (persistent notes the
/// model can build up across turns — project conventions, TODOs, decisions).
pub struct MemoryTool {
    pub memory_file: Option<String>,
}

impl MemoryTool {
    fn path(&self) -> std::path::PathBuf {
        match &self.memory_file {
            Some(p) => std::path::PathBuf::from(p),
            None => std::path::PathBuf::from("COGENT_MEMORY.md"),
        }
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Read or append to the project's persistent memory file. \
         action: 'read' (default) returns the full contents; 'append' adds a \
         new line (requires 'content')."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["read", "append"],
                    "description": "read (default) or append"
                },
                "content": {
                    "type": "string",
                    "description": "Text to append (required when action=append)"
                }
            },
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let action = call.args.get("action").and_then(|v| v.as_str()).unwrap_or("read");
        let path = self.path();

        match action {
            "read" => match std::fs::read_to_string(&path) {
                Ok(content) if content.trim().is_empty() => {
                    ToolOutput::ok(&call.id, "(memory file is empty)")
                }
                Ok(content) => ToolOutput::ok(&call.id, content),
                Err(_) => ToolOutput::ok(&call.id, "(no memory file yet)"),
            },
            "append" => {
                let Some(content) = call.args.get("content").and_then(|v| v.as_str()) else {
                    return ToolOutput::err(&call.id, "missing required parameter 'content' for action=append");
                };
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        let _ = std::fs::create_dir_all(parent);
                    }
                }
                use std::io::Write;
                let result = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .and_then(|mut f| writeln!(f, "{content}"));
                match result {
                    Ok(()) => ToolOutput::ok(&call.id, format!("appended to {}", path.display())),
                    Err(e) => ToolOutput::err(&call.id, format!("failed to append to memory file: {e}")),
                }
            }
            other => ToolOutput::err(&call.id, format!("unknown action '{other}' (expected 'read' or 'append')")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(n: &str) -> String {
        std::env::temp_dir()
            .join(format!("cogent_memory_test_{}_{n}.md", std::process::id()))
            .display()
            .to_string()
    }

    #[tokio::test]
    async fn read_missing_file_returns_placeholder() {
        let path = tmp_path("1");
        let tool = MemoryTool { memory_file: Some(path) };
        let call = ToolCall { id: "m1".into(), name: "memory".into(), args: json!({"action": "read"}) };
        let out = tool.execute(&call).await;
        assert!(!out.is_error);
        assert!(out.content.contains("no memory file"));
    }

    #[tokio::test]
    async fn append_then_read_roundtrips() {
        let path = tmp_path("2");
        let tool = MemoryTool { memory_file: Some(path.clone()) };
        let append_call = ToolCall {
            id: "m2".into(),
            name: "memory".into(),
            args: json!({"action": "append", "content": "remember this"}),
        };
        let out = tool.execute(&append_call).await;
        assert!(!out.is_error, "{}", out.content);

        let read_call = ToolCall { id: "m3".into(), name: "memory".into(), args: json!({"action": "read"}) };
        let out = tool.execute(&read_call).await;
        assert!(out.content.contains("remember this"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn append_without_content_is_error() {
        let path = tmp_path("3");
        let tool = MemoryTool { memory_file: Some(path) };
        let call = ToolCall { id: "m4".into(), name: "memory".into(), args: json!({"action": "append"}) };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }
}
