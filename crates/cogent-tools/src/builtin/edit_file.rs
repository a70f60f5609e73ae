// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde_json::{json, Value};
use similar::{ChangeTag, TextDiff};
use tracing::debug;

use cogent_config::AgentMode;

use crate::builtin::file_tracker;
use crate::tool::{ApprovalPolicy, Tool, ToolCall, ToolOutput};

/// Similarity ratio in [0,1] using character-level diff (2×matches / total).
/// Used only to build a helpful "nearest match" suggestion in error messages —
/// it never decides whether an edit is applied.
fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let diff = TextDiff::from_chars(a, b);
    let matching: usize = diff
        .iter_all_changes()
        .filter(|c| c.tag() == ChangeTag::Equal)
        .map(|c| c.value().len())
        .sum();
    (matching * 2) as f64 / total as f64
}

/// Find the single window of `file` (split into lines of the same length as
/// `needle`) most similar to `needle`, for use in an error message. Returns
/// `None` if the file has fewer lines than `needle`.
fn nearest_match(content: &str, needle: &str) -> Option<(f64, usize, String)> {
    let needle_lines: Vec<&str> = needle.lines().collect();
    let n = needle_lines.len().max(1);
    let file_lines: Vec<&str> = content.lines().collect();
    if file_lines.len() < n {
        return None;
    }
    let needle_joined = needle_lines.join("\n");
    file_lines
        .windows(n)
        .enumerate()
        .map(|(i, win)| (similarity_ratio(&needle_joined, &win.join("\n")), i + 1, win.join("\n")))
        .filter(|(r, _, _)| *r > 0.3)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
}

/// Replaces exactly one occurrence of `old_string` with `new_string` in a
/// file, gated by the process-wide [`file_tracker`] to ensure the model is
/// editing content it has actually seen.
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing exactly one occurrence of old_string with new_string.\n\
         \n\
         Rules:\n\
         • old_string must match the file content exactly and occur exactly once;\n\
           include enough surrounding context to make the match unique.\n\
         • old_string and new_string must differ.\n\
         • The file must have been read with read_file (or written with write_file)\n\
           since its last on-disk modification — stale edits are refused.\n\
         • Pass old_string=\"\" to create a brand-new file with new_string as its\n\
           content; this fails if the file already exists.\n\
         \n\
         Re-read the file after any previous edit before constructing the next old_string."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace. Empty string creates a new file."
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                }
            },
            "required": ["path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Agent]
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "Missing required parameter: path"),
        };
        let old_string = match call.args.get("old_string").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "Missing required parameter: old_string"),
        };
        let new_string = match call.args.get("new_string").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "Missing required parameter: new_string"),
        };

        debug!(path = %path, "edit_file tool");

        if old_string == new_string {
            return ToolOutput::err(&call.id, "old_string and new_string must differ");
        }

        let file_path = std::path::Path::new(&path);

        // ── Create-new-file special case ────────────────────────────────────
        if old_string.is_empty() {
            if file_path.exists() {
                return ToolOutput::err(
                    &call.id,
                    format!("{} already exists — cannot create with an empty old_string", path),
                );
            }
            if let Some(parent) = file_path.parent() {
                if !parent.as_os_str().is_empty() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
            }
            return match tokio::fs::write(&path, &new_string).await {
                Ok(_) => {
                    if let Ok(abs) = std::fs::canonicalize(&path) {
                        file_tracker::global().record_read(&abs, std::time::SystemTime::now());
                    }
                    ToolOutput::ok(&call.id, format!("created {path}"))
                }
                Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
            };
        }

        // ── FileTracker gate ──────────────────────────────────────────────────
        let abs_path = match std::fs::canonicalize(file_path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };
        if let Err(msg) = file_tracker::global().check_overwrite(&abs_path) {
            return ToolOutput::err(&call.id, msg);
        }

        let content = match tokio::fs::read_to_string(&abs_path).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let occurrences = content.matches(old_string.as_str()).count();
        if occurrences == 0 {
            let mut msg = format!("old_string not found in {path}.\nExpected:\n{old_string}\n");
            if let Some((ratio, line_no, block)) = nearest_match(&content, &old_string) {
                msg.push_str(&format!(
                    "Nearest match at line {line_no} ({:.0}%):\n{block}\n",
                    ratio * 100.0
                ));
            }
            msg.push_str("Re-read the file, fix old_string, and retry.");
            return ToolOutput::err(&call.id, msg);
        }
        if occurrences > 1 {
            return ToolOutput::err(
                &call.id,
                format!(
                    "old_string occurs {occurrences} times in {path} — include more surrounding \
                     context so it matches exactly once"
                ),
            );
        }

        let new_content = content.replacen(old_string.as_str(), &new_string, 1);

        match tokio::fs::write(&abs_path, &new_content).await {
            Ok(_) => {
                file_tracker::global().record_read(&abs_path, std::time::SystemTime::now());
                ToolOutput::ok(&call.id, "Edit successfully applied")
            }
            Err(e) => ToolOutput::err(&call.id, format!("Write failed: {e}")),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
