// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Process-wide counters for API requests, tool calls, and context usage.
//!
//! Net new relative to the teacher (spec.md §4.3 names a dedicated counter
//! set that has no teacher-module counterpart). Plain accumulator: "no
//! locking needed if updates are confined to the control-loop thread" per
//! the design note, so this type carries no internal synchronization —
//! callers wrap it in a `Mutex<Stats>` only if they genuinely share it
//! across tasks.
use std::time::Duration;

/// Monotonic counters describing one session's activity, reset only by an
/// explicit call to [`Stats::reset`] (the `/new` control-loop command).
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub api_requests: u64,
    pub api_success: u64,
    pub api_errors: u64,
    pub api_time_spent: Duration,
    pub tool_calls: u64,
    pub tool_errors: u64,
    pub tool_time_spent: Duration,
    pub compactions: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Tokens in the next outgoing request, refreshed from server-reported
    /// `usage` when present, else from the local estimator.
    pub current_prompt_size: usize,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_api_request_started(&mut self) {
        self.api_requests += 1;
    }

    pub fn record_api_success(&mut self, elapsed: Duration, prompt_tokens: u64, completion_tokens: u64) {
        self.api_success += 1;
        self.api_time_spent += elapsed;
        self.prompt_tokens += prompt_tokens;
        self.completion_tokens += completion_tokens;
    }

    pub fn record_api_error(&mut self, elapsed: Duration) {
        self.api_errors += 1;
        self.api_time_spent += elapsed;
    }

    pub fn record_tool_call(&mut self, elapsed: Duration, is_error: bool) {
        self.tool_calls += 1;
        self.tool_time_spent += elapsed;
        if is_error {
            self.tool_errors += 1;
        }
    }

    pub fn record_compaction(&mut self) {
        self.compactions += 1;
    }

    pub fn set_current_prompt_size(&mut self, tokens: usize) {
        self.current_prompt_size = tokens;
    }

    /// Completion tokens produced per second of time spent in API calls.
    /// Returns 0.0 rather than dividing by zero when no time has elapsed.
    pub fn tokens_per_second(&self) -> f64 {
        let secs = self.api_time_spent.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.completion_tokens as f64 / secs
        }
    }

    /// Render a human-readable summary, the equivalent of the reference's
    /// `printStats(history?)`. `context` is `(used_tokens, max_tokens)` when
    /// the caller wants the context-usage gauge appended.
    pub fn render(&self, session_elapsed: Duration, context: Option<(usize, usize)>) -> String {
        let mut out = String::new();
        out.push_str(&format!("Session time:     {}\n", format_duration(session_elapsed)));
        out.push_str(&format!(
            "API requests:     {} ({} ok, {} failed)\n",
            self.api_requests, self.api_success, self.api_errors
        ));
        out.push_str(&format!("API time spent:   {}\n", format_duration(self.api_time_spent)));
        out.push_str(&format!(
            "Tool calls:       {} ({} failed)\n",
            self.tool_calls, self.tool_errors
        ));
        out.push_str(&format!("Tool time spent:  {}\n", format_duration(self.tool_time_spent)));
        out.push_str(&format!("Compactions:      {}\n", self.compactions));
        out.push_str(&format!(
            "Tokens:           {} prompt / {} completion ({:.1} tok/s)\n",
            self.prompt_tokens,
            self.completion_tokens,
            self.tokens_per_second()
        ));
        if let Some((used, max)) = context {
            out.push_str(&format!("Context usage:    {}\n", context_bar(used, max)));
        }
        out
    }

    pub fn reset(&mut self) {
        *self = Stats::default();
    }
}

fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// 20-cell ASCII gauge, e.g. `[##########----------]  50% (2000/4000)`.
fn context_bar(used: usize, max: usize) -> String {
    if max == 0 {
        return "n/a".to_string();
    }
    let pct = (used as f64 / max as f64).clamp(0.0, 1.0);
    let filled = (pct * 20.0).round() as usize;
    let bar: String = "#".repeat(filled) + &"-".repeat(20 - filled);
    format!("[{bar}] {:.0}% ({used}/{max})", pct * 100.0)
}
