// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The approval engine itself: rule-file precedence, dangerous-pattern
//! escalation, YOLO mode, the session-approval cache, and the interactive
//! `a/s/d/c/yolo/help/diff-edit` answer grammar (spec.md §4.6).
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cogent_config::RuleFile;
use cogent_tools::{ApprovalGate, ApprovalOutcome, ApprovalPolicy, ToolCall};
use tracing::{info, warn};

use crate::dangerous::dangerous_pattern_match;
use crate::key::{approval_key, ToolApprovalConfig};
use crate::prompter::Prompter;

/// Raised by the richer interactive API ([`ApprovalEngine::ask`]) when the
/// answer grammar is used directly by the control loop rather than through
/// the [`ApprovalGate`] seam. The `ApprovalGate` path instead represents
/// cancel-all as [`ApprovalOutcome::CancelAll`], since that trait's signature
/// has no room for a `Result`.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("user cancelled all pending tool calls")]
    CancelAll,
}

/// Outcome of one interactive decision, without the batch-cancellation
/// bookkeeping `ApprovalOutcome` carries — returned by [`ApprovalEngine::ask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Denied,
    DiffEditApplied(String),
}

struct ToolRuleFiles {
    auto_deny: RuleFile,
    ask_approval: RuleFile,
    auto_approve: RuleFile,
}

/// Stateful approval engine: one instance lives for the whole process and is
/// shared (via `Arc`) between the [`cogent_tools::ToolExecutor`] seam and the
/// control loop's own `/yolo` and `/revoke_approvals` commands.
pub struct ApprovalEngine {
    prompter: Arc<dyn Prompter>,
    session_approved: Mutex<HashSet<String>>,
    yolo: AtomicBool,
    configs: HashMap<String, ToolApprovalConfig>,
    rule_files: HashMap<String, ToolRuleFiles>,
    /// Trailing `+ free text` guidance collected during approval prompts,
    /// queued for delivery to the model as a user message after the current
    /// tool batch finishes executing (spec.md's queued-guidance resolution).
    guidance: Mutex<VecDeque<String>>,
}

impl ApprovalEngine {
    pub fn new(prompter: Arc<dyn Prompter>) -> Self {
        Self {
            prompter,
            session_approved: Mutex::new(HashSet::new()),
            yolo: AtomicBool::new(false),
            configs: HashMap::new(),
            rule_files: HashMap::new(),
            guidance: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_tool_config(mut self, tool_name: impl Into<String>, cfg: ToolApprovalConfig) -> Self {
        self.configs.insert(tool_name.into(), cfg);
        self
    }

    /// Loads `<dir>/<tool_name>.auto_deny`, `.ask_approval`, `.auto_approve`.
    /// Missing files parse as empty rule sets — most tools have none.
    pub fn load_rule_files(&mut self, tool_name: &str, dir: &Path) {
        self.load_rule_files_with_inline(tool_name, dir, &[], &[]);
    }

    /// Like [`Self::load_rule_files`], additionally folding in config-level
    /// inline patterns (e.g. `tools.auto_approve_patterns` / `deny_patterns`)
    /// so a user never has to create a rule file on disk just to get the
    /// patterns their `config.yaml` already lists.
    pub fn load_rule_files_with_inline(
        &mut self,
        tool_name: &str,
        dir: &Path,
        inline_auto_approve: &[String],
        inline_auto_deny: &[String],
    ) {
        let auto_deny = RuleFile::load(&dir.join(format!("{tool_name}.auto_deny")), false)
            .merge(RuleFile::parse(&inline_auto_deny.join("\n"), false));
        let ask_approval = RuleFile::load(&dir.join(format!("{tool_name}.ask_approval")), false);
        let auto_approve = RuleFile::load(&dir.join(format!("{tool_name}.auto_approve")), true)
            .merge(RuleFile::parse(&inline_auto_approve.join("\n"), true));
        self.rule_files.insert(tool_name.to_string(), ToolRuleFiles { auto_deny, ask_approval, auto_approve });
    }

    pub fn set_yolo(&self, on: bool) {
        self.yolo.store(on, Ordering::SeqCst);
    }

    pub fn is_yolo(&self) -> bool {
        self.yolo.load(Ordering::SeqCst)
    }

    /// `/revoke_approvals`: forget every "approved for this session" decision.
    /// Does not touch YOLO mode or rule files.
    pub fn revoke_all_approvals(&self) {
        self.session_approved.lock().expect("approval cache mutex poisoned").clear();
    }

    /// Drains and returns any `+ free text` guidance collected since the last
    /// call, in the order it was entered.
    pub fn drain_guidance(&self) -> Vec<String> {
        let mut q = self.guidance.lock().expect("guidance queue mutex poisoned");
        q.drain(..).collect()
    }

    fn match_text(&self, call: &ToolCall) -> String {
        if call.name == "run_shell_command" {
            call.args.get("command").and_then(|v| v.as_str()).unwrap_or("").to_string()
        } else {
            call.args.to_string()
        }
    }

    /// Richer entry point for the control loop: returns `Ok(Decision)` or
    /// `Err(ApprovalError::CancelAll)` rather than the batch-oriented
    /// `ApprovalOutcome` the `ApprovalGate` trait returns.
    pub async fn ask(&self, call: &ToolCall, policy: ApprovalPolicy) -> Result<Decision, ApprovalError> {
        match self.evaluate(call, policy).await {
            ApprovalOutcome::Approved => Ok(Decision::Approved),
            ApprovalOutcome::Denied => Ok(Decision::Denied),
            ApprovalOutcome::DiffEditApplied(c) => Ok(Decision::DiffEditApplied(c)),
            ApprovalOutcome::CancelAll => Err(ApprovalError::CancelAll),
        }
    }

    /// The precedence order: auto_deny (highest, applies even to dangerous
    /// commands) → dangerous pattern under YOLO (warn, approve) → ask_approval
    /// (forces a prompt even under YOLO) → auto_approve/YOLO/session-cache →
    /// interactive prompt.
    async fn evaluate(&self, call: &ToolCall, policy: ApprovalPolicy) -> ApprovalOutcome {
        if matches!(policy, ApprovalPolicy::Auto) {
            return ApprovalOutcome::Approved;
        }

        let cfg = self.configs.get(&call.name).cloned().unwrap_or_default();
        let match_text = self.match_text(call);

        let dangerous_reason =
            if call.name == "run_shell_command" { dangerous_pattern_match(&match_text) } else { None };

        // auto_deny has the highest precedence regardless of dangerous-pattern
        // detection (spec §4.6: a dangerous match "still allow[s] unless also
        // in auto_deny").
        if let Some(rules) = self.rule_files.get(&call.name) {
            if rules.auto_deny.matches(&match_text) {
                info!(tool = %call.name, "denied by auto_deny rule");
                return ApprovalOutcome::Denied;
            }
        }

        // Under YOLO, a dangerous pattern is a loud warning, not a forced
        // prompt: spec §4.6 — "matches force a prompt (or, under YOLO,
        // produce a loud warning but still allow unless also in auto_deny)".
        // The auto_deny check above has already run, so reaching here means
        // the command is not denied.
        if let Some(reason) = dangerous_reason {
            if self.yolo.load(Ordering::SeqCst) {
                warn!(
                    tool = %call.name,
                    command = %match_text,
                    reason,
                    "YOLO mode: approving a command matching a dangerous pattern"
                );
                return ApprovalOutcome::Approved;
            }
        }

        let force_prompt = dangerous_reason.is_some()
            || self.rule_files.get(&call.name).map(|r| r.ask_approval.matches(&match_text)).unwrap_or(false);

        if !force_prompt {
            let rule_auto_approved =
                self.rule_files.get(&call.name).map(|r| r.auto_approve.matches(&match_text)).unwrap_or(false);
            if cfg.auto_approved || rule_auto_approved {
                return ApprovalOutcome::Approved;
            }
            if self.yolo.load(Ordering::SeqCst) {
                return ApprovalOutcome::Approved;
            }
            let key = approval_key(&call.name, &call.args, &cfg);
            if self.session_approved.lock().expect("approval cache mutex poisoned").contains(&key) {
                return ApprovalOutcome::Approved;
            }
        }

        self.prompt_interactively(call, &cfg, &match_text, dangerous_reason).await
    }

    async fn prompt_interactively(
        &self,
        call: &ToolCall,
        cfg: &ToolApprovalConfig,
        match_text: &str,
        dangerous_reason: Option<&'static str>,
    ) -> ApprovalOutcome {
        let key = approval_key(&call.name, &call.args, cfg);
        let header = match dangerous_reason {
            Some(reason) => {
                format!("{} wants to run:\n  {match_text}\n\u{26a0} {reason} — this requires explicit approval.\n", call.name)
            }
            None => format!("{} wants to run:\n  {match_text}\n", call.name),
        };

        loop {
            let prompt =
                format!("{header}[a]pprove  [s]ession  [d]eny  [c]ancel-all  [y]olo  [diff-edit]  [help] > ");
            let raw = self.prompter.ask_line(&prompt).await;
            let (answer, guidance) = split_guidance(&raw);

            match answer.trim().to_lowercase().as_str() {
                "a" | "approve" => {
                    self.queue_guidance(guidance);
                    return ApprovalOutcome::Approved;
                }
                "s" | "session" => {
                    self.session_approved.lock().expect("approval cache mutex poisoned").insert(key);
                    self.queue_guidance(guidance);
                    return ApprovalOutcome::Approved;
                }
                "d" | "deny" | "" => {
                    self.queue_guidance(guidance);
                    return ApprovalOutcome::Denied;
                }
                "c" | "cancel" | "cancel-all" => return ApprovalOutcome::CancelAll,
                "yolo" => {
                    self.yolo.store(true, Ordering::SeqCst);
                    self.queue_guidance(guidance);
                    return ApprovalOutcome::Approved;
                }
                "diff-edit" => match self.run_diff_edit(call).await {
                    Some(content) => return ApprovalOutcome::DiffEditApplied(content),
                    None => {
                        println!("diff-edit isn't available for `{}` (no path/content to edit)", call.name);
                        continue;
                    }
                },
                "help" | "h" | "?" => {
                    print_help();
                    continue;
                }
                _ => {
                    println!("unrecognized answer '{answer}' — type 'help' for the list of commands");
                    continue;
                }
            }
        }
    }

    fn queue_guidance(&self, guidance: Option<String>) {
        if let Some(text) = guidance {
            if !text.trim().is_empty() {
                self.guidance.lock().expect("guidance queue mutex poisoned").push_back(text.trim().to_string());
            }
        }
    }

    /// Writes the tool's proposed content to a scratch file, opens `$EDITOR`
    /// on it, and — once the editor exits — writes the user's edited content
    /// back to the real target path and returns it as the tool's result.
    async fn run_diff_edit(&self, call: &ToolCall) -> Option<String> {
        let path = call.args.get("path").and_then(|v| v.as_str())?.to_string();
        let content = call.args.get("content").and_then(|v| v.as_str())?.to_string();

        let scratch = scratch_path(&path);
        if std::fs::write(&scratch, &content).is_err() {
            return None;
        }

        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
        let scratch_for_spawn = scratch.clone();
        let status = tokio::task::spawn_blocking(move || {
            std::process::Command::new(&editor).arg(&scratch_for_spawn).status()
        })
        .await
        .ok()?
        .ok()?;

        if !status.success() {
            warn!(path = %path, "diff-edit editor exited non-zero");
        }

        let edited = std::fs::read_to_string(&scratch).ok()?;
        let _ = std::fs::remove_file(&scratch);
        if std::fs::write(&path, &edited).is_err() {
            return None;
        }
        Some(edited)
    }
}

#[async_trait]
impl ApprovalGate for ApprovalEngine {
    async fn decide(&self, call: &ToolCall, policy: ApprovalPolicy) -> ApprovalOutcome {
        self.evaluate(call, policy).await
    }
}

fn scratch_path(target_path: &str) -> PathBuf {
    let name = Path::new(target_path).file_name().and_then(|n| n.to_str()).unwrap_or("edit");
    std::env::temp_dir().join(format!("cogent-diff-edit-{}-{name}", std::process::id()))
}

/// Splits an answer like `a + please also run the tests` into
/// `("a", Some("please also run the tests"))`. An answer with no `+` has no
/// guidance.
fn split_guidance(raw: &str) -> (&str, Option<String>) {
    match raw.split_once('+') {
        Some((cmd, guidance)) => (cmd.trim(), Some(guidance.trim().to_string())),
        None => (raw.trim(), None),
    }
}

fn print_help() {
    println!(
        "a          approve this call once\n\
         s          approve and remember for the rest of this session\n\
         d          deny this call\n\
         c          cancel this and every remaining queued tool call\n\
         yolo       enable YOLO mode (auto-approve everything from now on)\n\
         diff-edit  hand-edit the proposed change in $EDITOR before it's written\n\
         <answer> + <text>   append free-text guidance queued for the model"
    );
}
