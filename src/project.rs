// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Ambient context gathered once at startup and folded into
//! [`cogent_core::AgentRuntimeContext`]: project root (`.git` detection),
//! a volatile git status note, a CI-environment note, and an optional
//! project instructions file (`AGENTS.md` / `.cogent/context.md`).
use std::path::{Path, PathBuf};
use std::process::Command;

/// Walk upward from `start` looking for a `.git` directory or file (the
/// latter covers git worktrees, where `.git` is a pointer file).
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(".git").exists() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Runs `git` synchronously in `root` and returns its trimmed stdout, or
/// `None` if the command fails or is not found.
fn git(root: &Path, args: &[&str]) -> Option<String> {
    let out = Command::new("git").arg("-C").arg(root).args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

/// Formats a `## Git Context` block (branch, short commit, dirty count).
/// This is intentionally volatile — recomputed per process start, never
/// cached — since it changes on every commit and file edit.
pub fn git_context_note(root: &Path) -> Option<String> {
    let branch = git(root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let commit = git(root, &["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let dirty = git(root, &["status", "--porcelain"])
        .map(|s| s.lines().count())
        .unwrap_or(0);
    let status = if dirty == 0 { "clean".to_string() } else { format!("dirty ({dirty} file(s) changed)") };
    Some(format!("## Git Context\nBranch: {branch}\nCommit: {commit}\nStatus: {status}"))
}

/// Formats a `## CI Environment` block when a recognised CI env var is set.
pub fn ci_context_note() -> Option<String> {
    let (name, branch_var) = if std::env::var("GITHUB_ACTIONS").is_ok() {
        ("GitHub Actions", "GITHUB_REF_NAME")
    } else if std::env::var("GITLAB_CI").is_ok() {
        ("GitLab CI", "CI_COMMIT_REF_NAME")
    } else if std::env::var("CIRCLECI").is_ok() {
        ("CircleCI", "CIRCLE_BRANCH")
    } else if std::env::var("JENKINS_URL").is_ok() {
        ("Jenkins", "GIT_BRANCH")
    } else if std::env::var("CI").is_ok() {
        ("CI", "")
    } else {
        return None;
    };
    let branch = std::env::var(branch_var).ok();
    match branch {
        Some(b) if !b.is_empty() => Some(format!("## CI Environment\nRunning in: {name}\nBranch: {b}")),
        _ => Some(format!("## CI Environment\nRunning in: {name}")),
    }
}

/// Reads the first of `AGENTS.md`, `.cogent/context.md` found under `root`.
pub fn project_context_file(root: &Path) -> Option<String> {
    for candidate in ["AGENTS.md", ".cogent/context.md"] {
        let path = root.join(candidate);
        if let Ok(text) = std::fs::read_to_string(&path) {
            return Some(text);
        }
    }
    None
}
