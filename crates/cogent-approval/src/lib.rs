// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The interactive approval engine (spec.md §4.6 / C6).
//!
//! Net new relative to the teacher — no module in the retained crates
//! gates a tool call behind an interactive prompt before execution. Grounded
//! on the Python reference's `approval_system.py` (the five-step algorithm,
//! the full `a/s/d/c/yolo/help/diff/diff-edit` answer grammar, rule
//! precedence) and on `cogent-tools`'s own rule-precedence idiom already
//! used for dangerous-pattern style checks elsewhere in the tool crate.
mod dangerous;
mod engine;
mod key;
mod prompter;

pub use dangerous::dangerous_pattern_match;
pub use engine::{ApprovalEngine, ApprovalError, Decision, ToolApprovalConfig};
pub use key::approval_key;
pub use prompter::{Prompter, ScriptedPrompter, TerminalPrompter};
