// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Persistent JSON key/value store (`~/.config/cogent/persistent.json`)
//! that overrides environment values for a small, fixed set of keys
//! (truncation limit, per-plugin toggles).
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs4::FileExt;
use serde_json::Value;
use tracing::warn;

/// Default display truncation limit for argument/result values, used when
/// neither the persistent store nor the environment names an override.
pub const DEFAULT_TRUNCATION_LIMIT: usize = 4000;

/// The user config directory, `~/.config/cogent` (or the platform
/// equivalent via the `dirs` crate).
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cogent")
}

/// A JSON object of arbitrary key/value overrides, loaded from
/// `<config_dir>/persistent.json`. Reads happen on demand; writes are
/// guarded by a best-effort advisory `flock` so two concurrent processes
/// don't interleave partial writes.
#[derive(Debug, Clone, Default)]
pub struct PersistentStore {
    path: PathBuf,
    values: HashMap<String, Value>,
}

impl PersistentStore {
    /// Load the store from `<config_dir>/persistent.json`. A missing or
    /// unparseable file yields an empty store rather than an error — the
    /// persistent store is always an optional overlay.
    pub fn load() -> Self {
        Self::load_from(config_dir().join("persistent.json"))
    }

    pub fn load_from(path: PathBuf) -> Self {
        let values = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<HashMap<String, Value>>(&text).ok())
            .unwrap_or_default();
        Self { path, values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.values.get(key).and_then(|v| v.as_u64()).map(|n| n as usize)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(|v| v.as_bool())
    }

    /// Set `key` and persist the whole store to disk immediately, under an
    /// advisory flock. Best-effort: a write failure is logged, not fatal.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
        if let Err(e) = self.flush() {
            warn!(error = %e, path = %self.path.display(), "failed to persist config store");
        }
    }

    fn flush(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        FileExt::lock_exclusive(&file)?;
        let body = serde_json::to_string_pretty(&self.values).unwrap_or_default();
        file.set_len(0)?;
        use std::io::Seek;
        file.seek(std::io::SeekFrom::Start(0))?;
        file.write_all(body.as_bytes())?;
        let _ = FileExt::unlock(&file);
        Ok(())
    }

    /// `getEffectiveTruncationLimit()`: persistent store, then
    /// `COGENT_DEFAULT_TRUNCATION_LIMIT` env var, then the built-in default.
    pub fn effective_truncation_limit(&self) -> usize {
        if let Some(v) = self.get_usize("truncation_limit") {
            return v;
        }
        if let Ok(env_val) = std::env::var("COGENT_DEFAULT_TRUNCATION_LIMIT") {
            if let Ok(parsed) = env_val.parse() {
                return parsed;
            }
        }
        DEFAULT_TRUNCATION_LIMIT
    }
}

/// Read an entire file with no special handling, used only by tests that
/// need to assert on the raw on-disk JSON shape.
#[cfg(test)]
fn read_file(path: &Path) -> String {
    let mut s = String::new();
    std::fs::File::open(path).unwrap().read_to_string(&mut s).unwrap();
    s
}
