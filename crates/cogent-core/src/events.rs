// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use cogent_config::AgentMode;
use cogent_tools::ToolCall;

/// Which compaction strategy actually ran for a given `ContextCompacted` event.
///
/// `Emergency` is reported whenever the deterministic drop-and-notice path
/// ran, regardless of why (no model call was attempted, or the model call
/// failed/returned empty and `ensure_fits_budget` fell back).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategyUsed {
    Narrative,
    Structured,
    Emergency,
}

/// Events emitted by the agent during a single turn.
/// Consumers (CLI loop) subscribe to these to drive their output.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A text chunk streamed from the model
    TextDelta(String),
    /// A complete text response from the model (after streaming finishes)
    TextComplete(String),
    /// A thinking/reasoning chunk from the model (extended thinking API).
    /// Consumers should accumulate deltas and finalise them into a Thinking
    /// segment when the model signals the end of the reasoning block.
    ThinkingDelta(String),
    /// A complete thinking/reasoning block (accumulated from ThinkingDelta events).
    ThinkingComplete(String),
    /// The model has requested a tool call
    ToolCallStarted(ToolCall),
    /// A tool call finished
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// Context was compacted; statistics for the UI
    ContextCompacted {
        tokens_before: usize,
        tokens_after: usize,
        strategy: CompactionStrategyUsed,
        turn: u32,
    },
    /// Current token usage update
    TokenUsage {
        input: u32,
        output: u32,
        /// Tokens served from the provider's prompt cache this turn.
        cache_read: u32,
        /// Tokens written into the provider's prompt cache this turn.
        cache_write: u32,
        /// Running total of cache-read tokens across the session.
        cache_read_total: u64,
        /// Running total of cache-write tokens across the session.
        cache_write_total: u64,
        /// The session's current context-window budget.
        max_tokens: usize,
    },
    /// The agent has finished processing the current user turn
    TurnComplete,
    /// The current turn was cancelled (ESC/Ctrl-C).  Any text already
    /// streamed has been committed to the session as a partial assistant
    /// message; `partial_text` carries the same text for immediate display.
    Aborted { partial_text: String },
    /// A recoverable error occurred
    Error(String),
    /// The agent mode was changed (`/plan`, `/yolo`, or a config reload)
    ModeChanged(AgentMode),
    /// The user cancelled an entire batch of tool calls mid-approval
    /// (the approval engine's `c)` response). Every tool call in the batch,
    /// including those not yet reached, has already received a synthetic
    /// denial tool message so the transcript stays well-formed; the control
    /// loop should return to idle without issuing a further API request.
    ToolsCancelled,
}
