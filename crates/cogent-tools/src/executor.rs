// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::registry::ToolRegistry;
use crate::tool::{ApprovalPolicy, ToolCall, ToolOutput};

/// The four ways a configured tool call can be dispatched (spec 4.7.1–4.7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// A Rust-native handler registered in the [`ToolRegistry`].
    Internal,
    /// Substitutes arguments into a shell command template.
    Command,
    /// POSTs a JSON-RPC 2.0 request to a configured URL.
    JsonRpc,
    /// Routed through the MCP-stdio supervisor to an owning server.
    McpStdio,
}

/// A non-internal tool definition loaded from user configuration.
#[derive(Debug, Clone)]
pub struct CommandToolDefinition {
    pub name: String,
    /// Shell command template; `{arg_name}` placeholders are substituted.
    pub command: String,
    /// Optional command run (and printed) before `command`.
    pub preview_command: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct JsonRpcToolDefinition {
    pub name: String,
    pub url: String,
}

/// Approval decision requested by the executor before running a non-Auto tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Denied,
    /// The user cancelled this and every remaining tool call in the batch.
    CancelAll,
    /// The user resolved a `write_file`/`edit_file` approval prompt through
    /// the `diff-edit` flow: they hand-edited a temp file and that content
    /// should become the tool's result verbatim, bypassing the tool's own
    /// `execute()` — the approval engine already applied the edit to disk.
    DiffEditApplied(String),
}

/// Extension point implemented by the approval engine crate. Injected so this
/// crate never depends on the (higher-level) approval crate directly.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn decide(&self, call: &ToolCall, policy: ApprovalPolicy) -> ApprovalOutcome;
}

/// Approves everything without prompting. Used when no interactive approval
/// engine is wired in (headless/test contexts).
pub struct AutoApproveGate;

#[async_trait]
impl ApprovalGate for AutoApproveGate {
    async fn decide(&self, _call: &ToolCall, _policy: ApprovalPolicy) -> ApprovalOutcome {
        ApprovalOutcome::Approved
    }
}

/// Routes an MCP-stdio tool call to its owning server. Implemented by the MCP
/// supervisor crate.
#[async_trait]
pub trait McpRouter: Send + Sync {
    async fn call(&self, tool_name: &str, arguments: Value) -> Result<Value, String>;
}

/// Dispatches parsed, validated tool calls to the handler matching their
/// [`DispatchKind`], calling the [`ApprovalGate`] at the right moment.
///
/// Mirrors `executeToolCalls` (spec 4.7): for each call, resolve → parse
/// arguments → validate against schema → dispatch.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    command_tools: HashMap<String, CommandToolDefinition>,
    jsonrpc_tools: HashMap<String, JsonRpcToolDefinition>,
    approval: Arc<dyn ApprovalGate>,
    mcp: Option<Arc<dyn McpRouter>>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            command_tools: HashMap::new(),
            jsonrpc_tools: HashMap::new(),
            approval: Arc::new(AutoApproveGate),
            mcp: None,
        }
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = gate;
        self
    }

    pub fn with_mcp_router(mut self, router: Arc<dyn McpRouter>) -> Self {
        self.mcp = Some(router);
        self
    }

    pub fn register_command_tool(&mut self, def: CommandToolDefinition) {
        self.command_tools.insert(def.name.clone(), def);
    }

    pub fn register_jsonrpc_tool(&mut self, def: JsonRpcToolDefinition) {
        self.jsonrpc_tools.insert(def.name.clone(), def);
    }

    fn dispatch_kind(&self, name: &str) -> Option<DispatchKind> {
        if self.registry.get(name).is_some() {
            Some(DispatchKind::Internal)
        } else if self.command_tools.contains_key(name) {
            Some(DispatchKind::Command)
        } else if self.jsonrpc_tools.contains_key(name) {
            Some(DispatchKind::JsonRpc)
        } else if self.mcp.is_some() {
            // Unknown names are assumed MCP-stdio; the router itself returns
            // an error for names it doesn't own.
            Some(DispatchKind::McpStdio)
        } else {
            None
        }
    }

    /// Executes every tool call in `calls`, in order. Stops issuing new calls
    /// (but still returns a denial result for each remaining one) as soon as
    /// the approval gate reports `CancelAll`.
    pub async fn execute_all(&self, calls: &[ToolCall]) -> (Vec<ToolOutput>, bool) {
        let mut results = Vec::with_capacity(calls.len());
        let mut cancel_all = false;

        for call in calls {
            if cancel_all {
                results.push(ToolOutput::err(&call.id, "cancelled: user aborted remaining tool calls"));
                continue;
            }
            let (out, cancel) = self.execute_one(call).await;
            if cancel {
                cancel_all = true;
            }
            results.push(out);
        }

        (results, cancel_all)
    }

    /// Executes a single tool call. Returns `(result, cancel_all)`.
    pub async fn execute_one(&self, call: &ToolCall) -> (ToolOutput, bool) {
        let Some(kind) = self.dispatch_kind(&call.name) else {
            return (ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)), false);
        };

        let normalized_args = match normalize_arguments(&call.args) {
            Ok(v) => v,
            Err(e) => return (ToolOutput::err(&call.id, format!("argument error: {e}")), false),
        };
        let normalized_call = ToolCall { id: call.id.clone(), name: call.name.clone(), args: normalized_args };

        if kind == DispatchKind::Internal {
            let tool = self.registry.get(&call.name).expect("dispatch_kind confirmed presence");
            if let Err(e) = validate_against_schema(&normalized_call.args, &tool.parameters_schema()) {
                // Validation failures never reach the approval engine.
                return (ToolOutput::err(&call.id, format!("invalid arguments: {e}")), false);
            }

            let policy = tool.default_policy();
            if !matches!(policy, ApprovalPolicy::Auto) {
                match self.approval.decide(&normalized_call, policy).await {
                    ApprovalOutcome::Denied => {
                        return (ToolOutput::err(&call.id, "EXECUTION DENIED BY THE USER"), false);
                    }
                    ApprovalOutcome::CancelAll => {
                        return (ToolOutput::err(&call.id, "cancelled: user aborted remaining tool calls"), true);
                    }
                    ApprovalOutcome::DiffEditApplied(content) => {
                        return (ToolOutput::ok(&call.id, content), false);
                    }
                    ApprovalOutcome::Approved => {}
                }
            }

            return (tool.execute(&normalized_call).await, false);
        }

        match kind {
            DispatchKind::Command => (self.run_command_tool(&normalized_call).await, false),
            DispatchKind::JsonRpc => (self.run_jsonrpc_tool(&normalized_call).await, false),
            DispatchKind::McpStdio => (self.run_mcp_tool(&normalized_call).await, false),
            DispatchKind::Internal => unreachable!(),
        }
    }

    /// 4.7.2 Command handler: substitutes arguments into the command
    /// template, optionally runs a preview command first, then runs the
    /// substituted command under a shell with a timeout.
    async fn run_command_tool(&self, call: &ToolCall) -> ToolOutput {
        let Some(def) = self.command_tools.get(&call.name) else {
            return ToolOutput::err(&call.id, format!("unknown command tool: {}", call.name));
        };
        let substituted = match substitute_template(&def.command, &call.args) {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, format!("template error: {e}")),
        };

        if let Some(preview) = &def.preview_command {
            if let Ok(p) = substitute_template(preview, &call.args) {
                let _ = run_shell_with_timeout(&p, def.timeout_secs).await;
            }
        }

        match run_shell_with_timeout(&substituted, def.timeout_secs).await {
            Ok((stdout, stderr, code)) => ToolOutput::ok(
                &call.id,
                format!("stdout:\n{stdout}\nstderr:\n{stderr}\nexit code: {code}"),
            ),
            Err(e) => ToolOutput::err(&call.id, format!("command failed: {e}")),
        }
    }

    /// 4.7.3 JSON-RPC handler: POSTs `{jsonrpc, method, params, id}` and
    /// returns `result` on success, or the `error` object on failure.
    async fn run_jsonrpc_tool(&self, call: &ToolCall) -> ToolOutput {
        let Some(def) = self.jsonrpc_tools.get(&call.name) else {
            return ToolOutput::err(&call.id, format!("unknown json-rpc tool: {}", call.name));
        };
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": call.name,
            "params": call.args,
            "id": 1,
        });

        let client = reqwest::Client::new();
        let resp = match client.post(&def.url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("request failed: {e}")),
        };
        let parsed: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid json-rpc response: {e}")),
        };

        if let Some(error) = parsed.get("error") {
            return ToolOutput::err(&call.id, error.to_string());
        }
        let result = parsed.get("result").cloned().unwrap_or(Value::Null);
        ToolOutput::ok(&call.id, result.to_string())
    }

    /// 4.7.4 MCP-stdio handler: resolves the owning server via the injected
    /// router and returns the raw result.
    async fn run_mcp_tool(&self, call: &ToolCall) -> ToolOutput {
        let Some(router) = &self.mcp else {
            return ToolOutput::err(&call.id, format!("no MCP router configured for tool: {}", call.name));
        };
        match router.call(&call.name, call.args.clone()).await {
            Ok(result) => ToolOutput::ok(&call.id, result.to_string()),
            Err(e) => ToolOutput::err(&call.id, e),
        }
    }
}

/// Runs `command` through `sh -c` with a timeout, killing the whole process
/// group on expiry. Mirrors the approach used by [`crate::builtin::shell`].
async fn run_shell_with_timeout(command: &str, timeout_secs: u64) -> Result<(String, String, i32), String> {
    use std::process::Stdio;
    #[cfg(unix)]
    use std::os::unix::process::CommandExt;

    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = cmd.spawn().map_err(|e| e.to_string())?;
    let pid = child.id();

    let run = async {
        let stdout_fut = async {
            let mut buf = Vec::new();
            if let Some(mut s) = child.stdout.take() {
                let _ = tokio::io::AsyncReadExt::read_to_end(&mut s, &mut buf).await;
            }
            buf
        };
        let stderr_fut = async {
            let mut buf = Vec::new();
            if let Some(mut s) = child.stderr.take() {
                let _ = tokio::io::AsyncReadExt::read_to_end(&mut s, &mut buf).await;
            }
            buf
        };
        let (stdout, stderr) = tokio::join!(stdout_fut, stderr_fut);
        let status = child.wait().await;
        (stdout, stderr, status)
    };

    match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), run).await {
        Ok((stdout, stderr, status)) => {
            let code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
            Ok((String::from_utf8_lossy(&stdout).into_owned(), String::from_utf8_lossy(&stderr).into_owned(), code))
        }
        Err(_) => {
            #[cfg(unix)]
            if let Some(pid) = pid {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            Err(format!("command timed out after {timeout_secs}s"))
        }
    }
}

/// Substitutes `{name}` placeholders in `template` with string values from
/// `args`. Missing keys are an error.
fn substitute_template(template: &str, args: &Value) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut key = String::new();
            let mut closed = false;
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    closed = true;
                    break;
                }
                key.push(c2);
            }
            if !closed {
                return Err(format!("unterminated placeholder in template: {template}"));
            }
            let value = args.get(&key).ok_or_else(|| format!("missing argument '{key}' for template"))?;
            match value {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Parses/normalises a tool call's `arguments` (spec 4.7 step 2):
/// - If already an object, pass through unchanged.
/// - If a JSON string, parse it (handles arguments double-encoded by a model).
/// - Primitive values are wrapped as `{"value": ...}`.
/// - A single-element array is unwrapped to its element before the above.
fn normalize_arguments(args: &Value) -> Result<Value, String> {
    let mut current = args.clone();

    // Multiply-encoded JSON strings: keep parsing while it's a string that
    // itself decodes to JSON, up to five rounds of re-decoding.
    const MAX_REDECODE_ROUNDS: u8 = 5;
    for _ in 0..MAX_REDECODE_ROUNDS {
        let Value::String(s) = &current else { break };
        match serde_json::from_str::<Value>(s) {
            Ok(parsed) => current = parsed,
            Err(_) => break, // a plain string argument, not JSON — stop
        }
    }

    if let Value::Array(items) = &current {
        if items.len() == 1 {
            current = items[0].clone();
        }
    }

    match current {
        Value::Object(_) => Ok(current),
        Value::Null => Ok(Value::Object(Default::default())),
        other => Ok(serde_json::json!({ "value": other })),
    }
}

/// Minimal JSON-schema validation (spec 4.7 step 3): required keys present,
/// additionalProperties respected, basic type checks on declared properties.
fn validate_against_schema(args: &Value, schema: &Value) -> Result<(), String> {
    let Value::Object(args_map) = args else {
        return Err("arguments must be a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
        for req in required {
            let Some(key) = req.as_str() else { continue };
            if !args_map.contains_key(key) {
                return Err(format!("missing required field '{key}'"));
            }
        }
    }

    let properties = schema.get("properties").and_then(|v| v.as_object());
    let additional_allowed = schema.get("additionalProperties").and_then(|v| v.as_bool()).unwrap_or(true);

    if !additional_allowed {
        if let Some(props) = properties {
            for key in args_map.keys() {
                if !props.contains_key(key) {
                    return Err(format!("unexpected field '{key}'"));
                }
            }
        }
    }

    if let Some(props) = properties {
        for (key, value) in args_map {
            let Some(prop_schema) = props.get(key) else { continue };
            let Some(expected_type) = prop_schema.get("type").and_then(|v| v.as_str()) else { continue };
            if !type_matches(value, expected_type) {
                warn!(field = %key, expected = %expected_type, "tool argument type mismatch");
                return Err(format!("field '{key}' should be of type '{expected_type}'"));
            }
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true, // unknown declared type — don't reject
    }
}
