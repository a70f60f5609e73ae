// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use cogent_model::Message;
use uuid::Uuid;

/// One saved turn in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub content: String,
}

/// In-memory conversation session.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
    /// Approximate total token count for the current message list
    pub token_count: usize,
    /// Maximum context tokens (set from model config / provider limits)
    pub max_tokens: usize,
    /// Maximum output tokens the model may produce in one completion, from
    /// the provider catalog. Reserved out of `max_tokens` when computing the
    /// usable input budget, since a reply has to fit in what's left over.
    pub max_output_tokens: usize,
    /// Estimated token cost of the tool schemas and dynamic system-prompt
    /// suffix sent with every request. Recomputed per turn by the agent
    /// (mode-dependent tool availability) and folded into the calibration
    /// baseline, since it's never reflected in `token_count`.
    pub schema_overhead: usize,
    /// Running total of cache-read tokens reported by the provider.
    pub cache_read_total: usize,
    /// Running total of cache-write tokens reported by the provider.
    pub cache_write_total: usize,
    /// Correction factor applied to the chars/4 token estimate, updated
    /// from provider-reported actual usage as it comes in. Starts at 1.0
    /// (trust the raw estimate until real numbers arrive).
    pub calibration_factor: f32,
}

/// On-disk representation written by [`Session::save`] / read by
/// [`Session::load`] and by the crash-recovery files (`session_crash.json`).
/// A separate struct (rather than deriving `Serialize`/`Deserialize`
/// directly on [`Session`]) keeps the file format stable even if `Session`
/// later grows fields — like `token_count` — that are cheap to recompute
/// and shouldn't be trusted from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    id: String,
    max_tokens: usize,
    messages: Vec<Message>,
}

impl Session {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            token_count: 0,
            max_tokens,
            max_output_tokens: 0,
            schema_overhead: 0,
            cache_read_total: 0,
            cache_write_total: 0,
            calibration_factor: 1.0,
        }
    }

    /// Usable input budget: the context window minus the reply's own
    /// reserved output tokens. Never underflows; falls back to the full
    /// context window when `max_output_tokens` was never set.
    pub fn input_budget(&self) -> usize {
        self.max_tokens.saturating_sub(self.max_output_tokens)
    }

    /// Accumulates provider-reported cache usage into the running totals.
    pub fn add_cache_usage(&mut self, cache_read_tokens: u32, cache_write_tokens: u32) {
        self.cache_read_total += cache_read_tokens as usize;
        self.cache_write_total += cache_write_tokens as usize;
    }

    /// Folds a fresh actual/estimated ratio into the running calibration
    /// factor as an exponential moving average, so a single noisy turn
    /// can't swing the estimate. Clamped to a sane range since a wildly
    /// off factor (e.g. from a near-zero `estimated`) would make the
    /// compaction threshold check useless.
    pub fn update_calibration(&mut self, actual_input: u32, estimated: usize) {
        if estimated == 0 {
            return;
        }
        let ratio = actual_input as f32 / estimated as f32;
        let ratio = ratio.clamp(0.25, 4.0);
        const ALPHA: f32 = 0.3;
        self.calibration_factor = self.calibration_factor * (1.0 - ALPHA) + ratio * ALPHA;
    }

    pub fn push(&mut self, msg: Message) {
        self.token_count += msg.approx_tokens();
        self.messages.push(msg);
    }

    pub fn push_many(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for m in msgs { self.push(m); }
    }

    /// Fraction of context window consumed (0.0–1.0)
    pub fn context_fraction(&self) -> f32 {
        if self.max_tokens == 0 { return 0.0; }
        (self.token_count as f32) / (self.max_tokens as f32)
    }

    pub fn is_near_limit(&self, threshold: f32) -> bool {
        self.context_fraction() >= threshold
    }

    /// Recalculate token count from scratch (call after compaction).
    pub fn recalculate_tokens(&mut self) {
        self.token_count = self.messages.iter().map(|m| m.approx_tokens()).sum();
    }

    /// Replace the message list and recalculate token count (for resubmit / edit).
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.recalculate_tokens();
    }

    /// Serializes this session to pretty-printed JSON at `path`, creating
    /// any missing parent directories. Used by both `/save` and the
    /// crash-recovery write (spec.md §4.9's `saveSession`).
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = SessionFile { id: self.id.clone(), max_tokens: self.max_tokens, messages: self.messages.clone() };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a session previously written by [`Session::save`]
    /// (`loadSession`). The token count is recomputed rather than trusted
    /// from the file, since `approx_tokens()` may have changed since the
    /// file was written.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let file: SessionFile = serde_json::from_str(&text)?;
        let mut session = Self {
            id: file.id,
            messages: Vec::new(),
            token_count: 0,
            max_tokens: file.max_tokens,
            max_output_tokens: 0,
            schema_overhead: 0,
            cache_read_total: 0,
            cache_write_total: 0,
            calibration_factor: 1.0,
        };
        session.push_many(file.messages);
        Ok(session)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
