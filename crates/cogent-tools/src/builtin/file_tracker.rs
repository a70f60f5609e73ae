// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;

/// Process-wide `path → last_read_timestamp` map.
///
/// `write_file` and `edit_file` consult this before overwriting a file: if
/// the file's current mtime is newer than the tracked read time (or the
/// file was never read), the write is refused. A successful read_file
/// records here; a successful write_file also records here, so a
/// subsequent edit_file does not require a fresh read.
#[derive(Debug, Default)]
pub struct FileTracker {
    reads: Mutex<HashMap<PathBuf, SystemTime>>,
}

impl FileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` (absolute) was successfully read at `now`.
    pub fn record_read(&self, path: &Path, now: SystemTime) {
        self.reads
            .lock()
            .expect("FileTracker mutex poisoned")
            .insert(path.to_path_buf(), now);
    }

    /// Last recorded read timestamp for `path`, if any.
    pub fn last_read(&self, path: &Path) -> Option<SystemTime> {
        self.reads
            .lock()
            .expect("FileTracker mutex poisoned")
            .get(path)
            .copied()
    }

    /// Returns `Ok(())` if `path` may be overwritten: either it has never
    /// existed, or it was read at or after its current mtime.
    pub fn check_overwrite(&self, path: &Path) -> Result<(), String> {
        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => return Ok(()), // file does not exist yet — nothing to protect
        };
        let mtime = meta
            .modified()
            .map_err(|e| format!("could not read mtime of {}: {e}", path.display()))?;
        match self.last_read(path) {
            None => Err("You must read the file using the read_file tool before editing it.".to_string()),
            Some(read_at) if mtime > read_at => Err(format!(
                "{} was modified since it was last read — re-read it before writing.",
                path.display()
            )),
            Some(_) => Ok(()),
        }
    }
}

/// Process-wide singleton instance, shared by all tool invocations.
pub fn global() -> &'static FileTracker {
    static INSTANCE: OnceLock<FileTracker> = OnceLock::new();
    INSTANCE.get_or_init(FileTracker::new)
}
