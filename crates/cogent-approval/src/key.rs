// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Derivation of the string key used to remember "approved for this
//! session" decisions (spec.md §3 `ApprovalKey`).
use serde_json::Value;

/// Per-tool knobs that change how its approval key is derived.
#[derive(Debug, Clone, Default)]
pub struct ToolApprovalConfig {
    /// If true, the tool is always auto-approved regardless of rule files —
    /// used by user configuration to downgrade a built-in `Ask` tool.
    pub auto_approved: bool,
    /// If true, the key is the bare tool name: every call to this tool
    /// shares one session-approval slot regardless of arguments.
    pub approval_excludes_arguments: bool,
    /// Argument names to drop from the key even when arguments are
    /// otherwise included (e.g. a `reason` field that varies every call).
    pub approval_key_exclude_arguments: Vec<String>,
}

/// Builds the session-approval cache key for one tool call.
///
/// - `run_shell_command` is special-cased: the key is
///   `run_shell_command:<basename of the first whitespace-delimited token
///   of the command argument>`, so `run_shell_command` with `cargo build`
///   and `cargo test` share one approval slot keyed on `cargo`, while `git
///   status` and `ls` do not.
/// - If `cfg.approval_excludes_arguments`, the key is the bare tool name.
/// - Otherwise the key is `name:k1=v1&k2=v2...` over the call's argument
///   keys, sorted lexicographically and with any
///   `approval_key_exclude_arguments` entries dropped, so the form is
///   stable regardless of the order the model emitted them in.
pub fn approval_key(tool_name: &str, arguments: &Value, cfg: &ToolApprovalConfig) -> String {
    if tool_name == "run_shell_command" {
        let command = arguments.get("command").and_then(|v| v.as_str()).unwrap_or("");
        let first_token = command.split_whitespace().next().unwrap_or("");
        let basename = first_token.rsplit('/').next().unwrap_or(first_token);
        return format!("run_shell_command:{basename}");
    }

    if cfg.approval_excludes_arguments {
        return tool_name.to_string();
    }

    let Value::Object(map) = arguments else {
        return tool_name.to_string();
    };

    let mut keys: Vec<&String> = map
        .keys()
        .filter(|k| !cfg.approval_key_exclude_arguments.contains(k))
        .collect();
    keys.sort();

    if keys.is_empty() {
        return tool_name.to_string();
    }

    let pairs: Vec<String> = keys
        .into_iter()
        .map(|k| format!("{k}={}", value_to_key_fragment(&map[k])))
        .collect();
    format!("{tool_name}:{}", pairs.join("&"))
}

fn value_to_key_fragment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn shell_command_keys_on_basename_of_first_token() {
        let cfg = ToolApprovalConfig::default();
        let a = approval_key("run_shell_command", &json!({"command": "cargo build"}), &cfg);
        let b = approval_key("run_shell_command", &json!({"command": "cargo test --lib"}), &cfg);
        assert_eq!(a, b);
        assert_eq!(a, "run_shell_command:cargo");
    }

    #[test]
    fn shell_command_keys_strip_path_prefix() {
        let cfg = ToolApprovalConfig::default();
        let key = approval_key("run_shell_command", &json!({"command": "/usr/bin/git status"}), &cfg);
        assert_eq!(key, "run_shell_command:git");
    }

    #[test]
    fn shell_command_differs_across_programs() {
        let cfg = ToolApprovalConfig::default();
        let a = approval_key("run_shell_command", &json!({"command": "ls -la"}), &cfg);
        let b = approval_key("run_shell_command", &json!({"command": "git status"}), &cfg);
        assert_ne!(a, b);
    }

    #[test]
    fn excludes_arguments_flag_collapses_to_bare_name() {
        let cfg = ToolApprovalConfig { approval_excludes_arguments: true, ..Default::default() };
        let a = approval_key("edit_file", &json!({"path": "a.rs"}), &cfg);
        let b = approval_key("edit_file", &json!({"path": "b.rs"}), &cfg);
        assert_eq!(a, b);
        assert_eq!(a, "edit_file");
    }

    #[test]
    fn argument_order_does_not_affect_key() {
        let cfg = ToolApprovalConfig::default();
        let a = approval_key("write_file", &json!({"path": "x", "content": "y"}), &cfg);
        let b = approval_key("write_file", &json!({"content": "y", "path": "x"}), &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn excluded_argument_names_are_dropped_from_key() {
        let cfg = ToolApprovalConfig {
            approval_key_exclude_arguments: vec!["reason".to_string()],
            ..Default::default()
        };
        let a = approval_key("edit_file", &json!({"path": "x", "reason": "r1"}), &cfg);
        let b = approval_key("edit_file", &json!({"path": "x", "reason": "r2"}), &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn no_arguments_keys_on_bare_name() {
        let cfg = ToolApprovalConfig::default();
        assert_eq!(approval_key("pwd", &json!({}), &cfg), "pwd");
    }
}
