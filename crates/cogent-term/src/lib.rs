// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Terminal raw/cooked-mode control and cooperative ESC-key cancellation.
//!
//! Grounded on the Python reference's `terminal_manager.py` (raw/cooked
//! transition API, background ESC-poll worker, escape-sequence consumption)
//! adapted to `crossterm`, which already disambiguates a lone `Esc` key
//! event from an arrow/function-key escape sequence at the transport layer
//! — the background poller below only has to act on `KeyCode::Esc`.

mod coloriser;
mod controller;

pub use coloriser::Coloriser;
pub use controller::TerminalController;
