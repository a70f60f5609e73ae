// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Incremental ANSI colorization of streamed assistant text (spec.md §4.8).
//!
//! Grounded on the reference's `parse_markdown_streaming_style` (character
//! loop, four-mode precedence), adapted from a whole-string pass into a
//! [`Coloriser`] that carries its mode state across calls to [`Coloriser::feed`]
//! so it can be applied to each `TextDelta` chunk as it streams in rather than
//! only once on the fully-accumulated message. A run of consecutive backticks
//! or asterisks determines the fence/emphasis width, same as the reference's
//! look-ahead counting — but since a run can be split across two streamed
//! chunks, an unresolved run is held in `pending_run` until a differing
//! character (or end of turn, via [`Coloriser::finish`]) confirms its length.
const RESET: &str = "\x1b[0m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingRun {
    None,
    Ticks(u32),
    Stars(u32),
}

impl Default for PendingRun {
    fn default() -> Self {
        PendingRun::None
    }
}

/// Three overlapping highlighting modes, applied in fixed precedence order:
/// fenced code (backticks) > emphasis (asterisks) > headers (`#` at line
/// start). Persists state across [`Coloriser::feed`] calls so a mode begun
/// in one streamed chunk is honored when its closing marker arrives in a
/// later chunk.
#[derive(Debug, Default)]
pub struct Coloriser {
    in_code: bool,
    code_tick_count: u32,
    in_star: bool,
    star_count: u32,
    in_header: bool,
    at_line_start: bool,
    pending_run: PendingRun,
}

impl Coloriser {
    /// A fresh coloriser, as if at the start of a new assistant turn: no
    /// active mode, cursor considered to be at the start of a line.
    pub fn new() -> Self {
        Self { at_line_start: true, ..Self::default() }
    }

    fn finalize_pending_run(&mut self, out: &mut String) {
        match self.pending_run {
            PendingRun::None => {}
            PendingRun::Ticks(n) => {
                out.push_str(GREEN);
                for _ in 0..n {
                    out.push('`');
                }
                self.in_code = true;
                self.code_tick_count = n;
            }
            PendingRun::Stars(n) => {
                out.push_str(GREEN);
                for _ in 0..n {
                    out.push('*');
                }
                self.in_star = true;
                self.star_count = n;
            }
        }
        self.pending_run = PendingRun::None;
    }

    /// Colorize one chunk of streamed text, carrying mode state forward.
    pub fn feed(&mut self, chunk: &str) -> String {
        let mut out = String::with_capacity(chunk.len());

        for c in chunk.chars() {
            match self.pending_run {
                PendingRun::Ticks(n) if c == '`' => {
                    self.pending_run = PendingRun::Ticks(n + 1);
                    continue;
                }
                PendingRun::Stars(n) if c == '*' => {
                    self.pending_run = PendingRun::Stars(n + 1);
                    continue;
                }
                PendingRun::None => {}
                _ => self.finalize_pending_run(&mut out),
            }

            // Newlines reset per-line modes (header, emphasis); a fenced
            // code block persists across newlines until its closing
            // backticks arrive (spec.md §8's coloriser boundary property).
            if c == '\n' {
                self.at_line_start = true;
                if self.in_header {
                    out.push_str(RESET);
                    self.in_header = false;
                }
                if self.in_star {
                    out.push_str(RESET);
                    self.in_star = false;
                    self.star_count = 0;
                }
                out.push(c);
                continue;
            }

            // Precedence 1: inside a fenced code block, only look for
            // closing backticks (one decrement per backtick seen, exactly
            // as many as opened the fence).
            if self.in_code {
                out.push(c);
                if c == '`' {
                    self.code_tick_count -= 1;
                    if self.code_tick_count == 0 {
                        out.push_str(RESET);
                        self.in_code = false;
                    }
                }
                continue;
            }

            // Precedence 2: inside emphasis, only look for closing asterisks.
            if self.in_star {
                out.push(c);
                if c == '*' {
                    self.star_count -= 1;
                    if self.star_count == 0 {
                        out.push_str(RESET);
                        self.in_star = false;
                    }
                }
                continue;
            }

            // Precedence 3: a backtick opens a pending run; its length is
            // resolved once a non-backtick character (or newline, or
            // end-of-turn) is reached.
            if c == '`' {
                self.pending_run = PendingRun::Ticks(1);
                self.at_line_start = false;
                continue;
            }

            // Precedence 4: an asterisk opens a pending run the same way.
            if c == '*' {
                self.pending_run = PendingRun::Stars(1);
                self.at_line_start = false;
                continue;
            }

            // Precedence 5: header `#` — only at the start of a line.
            if self.at_line_start && c == '#' {
                out.push_str(RED);
                out.push(c);
                self.in_header = true;
                self.at_line_start = false;
                continue;
            }

            out.push(c);
            self.at_line_start = false;
        }

        out
    }

    /// Resolve any run still pending and close out any mode still open at
    /// end-of-turn (e.g. the model's last chunk ended mid-emphasis, or a
    /// trailing backtick run never got a chance to differ) so the terminal
    /// isn't left with a dangling ANSI attribute or a swallowed literal
    /// character. Returns the text to append after the final chunk, which
    /// may be empty.
    pub fn finish(&mut self) -> String {
        let mut tail = String::new();
        if self.pending_run != PendingRun::None {
            self.finalize_pending_run(&mut tail);
        }
        let any_open = self.in_code || self.in_star || self.in_header;
        self.in_code = false;
        self.in_star = false;
        self.in_header = false;
        self.code_tick_count = 0;
        self.star_count = 0;
        if any_open {
            tail.push_str(RESET);
        }
        tail
    }
}
