// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Crash safety (spec.md §4.9/§4.10): a process-wide handler writes the full
//! transcript plus a stats snapshot to `session_crash.json` whenever the
//! control loop dies with an uncaught error or panic. On the next startup,
//! if that file exists, the user is asked to reload, delete, or ignore it;
//! a successful reload renames the file to `session_crash_loaded.json` so
//! it is never mistaken for a *new* crash on a later run.
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Utc};
use cogent_model::Message;
use cogent_stats::Stats;
use serde::{Deserialize, Serialize};

/// Serializable subset of [`cogent_stats::Stats`] — `Duration` has no serde
/// impl in the workspace's `serde` feature set, so times are stored as
/// fractional seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub api_requests: u64,
    pub api_success: u64,
    pub api_errors: u64,
    pub api_time_spent_secs: f64,
    pub tool_calls: u64,
    pub tool_errors: u64,
    pub tool_time_spent_secs: f64,
    pub compactions: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl From<&Stats> for StatsSnapshot {
    fn from(s: &Stats) -> Self {
        Self {
            api_requests: s.api_requests,
            api_success: s.api_success,
            api_errors: s.api_errors,
            api_time_spent_secs: s.api_time_spent.as_secs_f64(),
            tool_calls: s.tool_calls,
            tool_errors: s.tool_errors,
            tool_time_spent_secs: s.tool_time_spent.as_secs_f64(),
            compactions: s.compactions,
            prompt_tokens: s.prompt_tokens,
            completion_tokens: s.completion_tokens,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CrashFile {
    messages: Vec<Message>,
    stats: StatsSnapshot,
    timestamp: DateTime<Utc>,
    note: Option<String>,
}

pub fn path_in(config_dir: &Path) -> PathBuf {
    config_dir.join("session_crash.json")
}

fn loaded_path_in(config_dir: &Path) -> PathBuf {
    config_dir.join("session_crash_loaded.json")
}

/// One in-process snapshot of "what to write if we crash right now",
/// refreshed by [`update_snapshot`] after every completed turn so the panic
/// hook installed by [`install_panic_hook`] has something recent to dump.
struct Snapshot {
    path: PathBuf,
    messages: Vec<Message>,
    stats: StatsSnapshot,
}

static SNAPSHOT: OnceLock<Mutex<Option<Snapshot>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Snapshot>> {
    SNAPSHOT.get_or_init(|| Mutex::new(None))
}

/// Call after every turn so the panic hook has a fresh transcript to dump.
pub fn update_snapshot(path: &Path, messages: &[Message], stats: &Stats) {
    let snap = Snapshot { path: path.to_path_buf(), messages: messages.to_vec(), stats: StatsSnapshot::from(stats) };
    *slot().lock().expect("crash snapshot mutex poisoned") = Some(snap);
}

/// Writes a crash file synchronously. Used both by the panic hook and by
/// the outermost `Err` handler in the control loop (spec.md's "Crash" row:
/// uncaught exception in control loop → write crash session file).
pub fn write(path: &Path, messages: &[Message], stats: &StatsSnapshot, note: Option<String>) {
    let file = CrashFile { messages: messages.to_vec(), stats: stats.clone(), timestamp: Utc::now(), note };
    let Ok(json) = serde_json::to_string_pretty(&file) else { return };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(path, json);
}

/// Installs a panic hook that dumps the latest [`update_snapshot`] value to
/// `session_crash.json` before the default hook prints the panic message.
/// Does nothing (silently) if no snapshot has been recorded yet — there is
/// nothing useful to save before the first turn starts.
pub fn install_panic_hook() {
    let original = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Ok(guard) = slot().lock() {
            if let Some(snap) = guard.as_ref() {
                write(&snap.path, &snap.messages, &snap.stats, Some(format!("panic: {info}")));
            }
        }
        original(info);
    }));
}

/// What the user chose to do with a crash file found at startup.
pub enum Resolution {
    /// Reload the transcript; the file has been renamed to
    /// `session_crash_loaded.json`.
    Reload(Vec<Message>),
    /// The file was deleted.
    Deleted,
    /// The file was left untouched.
    Ignored,
    /// No crash file was present.
    None,
}

/// Checks for a crash file under `config_dir` and, if present, asks the user
/// (via `ask`, a synchronous line-reading closure so this can run before the
/// async control loop and its terminal controller are set up) whether to
/// reload, delete, or ignore it.
pub fn check_and_resolve(config_dir: &Path, ask: impl Fn(&str) -> String) -> anyhow::Result<Resolution> {
    let path = path_in(config_dir);
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Resolution::None),
        Err(e) => return Err(e.into()),
    };
    let file: CrashFile = match serde_json::from_str(&text) {
        Ok(f) => f,
        Err(_) => {
            // Unparsable crash file — surface it but don't block startup on it.
            eprintln!("warning: found an unreadable crash file at {}, ignoring", path.display());
            return Ok(Resolution::Ignored);
        }
    };

    loop {
        let answer = ask(&format!(
            "A previous session crashed at {} ({} messages{}). Reload, delete, or ignore? [r/d/i] ",
            file.timestamp.to_rfc3339(),
            file.messages.len(),
            file.note.as_deref().map(|n| format!(": {n}")).unwrap_or_default(),
        ));
        match answer.trim().to_lowercase().as_str() {
            "r" | "reload" => {
                let _ = std::fs::rename(&path, loaded_path_in(config_dir));
                return Ok(Resolution::Reload(file.messages));
            }
            "d" | "delete" => {
                let _ = std::fs::remove_file(&path);
                return Ok(Resolution::Deleted);
            }
            "i" | "ignore" | "" => return Ok(Resolution::Ignored),
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_crash_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let res = check_and_resolve(dir.path(), |_| "i".to_string()).unwrap();
        assert!(matches!(res, Resolution::None));
    }

    #[test]
    fn write_then_resolve_reload_renames_file() {
        let dir = tempfile::tempdir().unwrap();
        let stats = StatsSnapshot::default();
        write(&path_in(dir.path()), &[Message::user("hi")], &stats, None);
        let res = check_and_resolve(dir.path(), |_| "r".to_string()).unwrap();
        match res {
            Resolution::Reload(msgs) => assert_eq!(msgs.len(), 1),
            _ => panic!("expected Reload"),
        }
        assert!(!path_in(dir.path()).exists());
        assert!(loaded_path_in(dir.path()).exists());
    }

    #[test]
    fn resolve_delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let stats = StatsSnapshot::default();
        write(&path_in(dir.path()), &[Message::user("hi")], &stats, None);
        let res = check_and_resolve(dir.path(), |_| "d".to_string()).unwrap();
        assert!(matches!(res, Resolution::Deleted));
        assert!(!path_in(dir.path()).exists());
    }

    #[test]
    fn resolve_ignore_leaves_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let stats = StatsSnapshot::default();
        write(&path_in(dir.path()), &[Message::user("hi")], &stats, None);
        let res = check_and_resolve(dir.path(), |_| "i".to_string()).unwrap();
        assert!(matches!(res, Resolution::Ignored));
        assert!(path_in(dir.path()).exists());
    }
}
