// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{ApprovalPolicy, Tool, ToolCall, ToolOutput};

/// Reports the agent's current working directory.
pub struct PwdTool;

#[async_trait]
impl Tool for PwdTool {
    fn name(&self) -> &str {
        "pwd"
    }

    fn description(&self) -> &str {
        "Print the current working directory (absolute path)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match std::env::current_dir() {
            Ok(dir) => ToolOutput::ok(&call.id, dir.display().to_string()),
            Err(e) => ToolOutput::err(&call.id, format!("could not determine cwd: {e}")),
        }
    }
}
