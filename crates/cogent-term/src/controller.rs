// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::terminal;
use crossterm::tty::IsTty;
use tracing::{debug, trace};

/// How often the background worker polls for input while it owns the
/// terminal (i.e. while not in prompt mode).
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Raw/cooked-mode switcher plus a background ESC-key cancellation poller.
///
/// Consumers query [`TerminalController::is_esc_pressed`] at quiescent
/// points — between streamed chunks, between tool calls, inside sleep
/// loops — rather than subscribing to an event stream. This mirrors the
/// Python reference's polling design: the controller never pushes
/// cancellation, callers pull it.
///
/// On a non-TTY (redirected stdin, `COGENT_TEST_MODE` set) the controller
/// becomes a no-op that always reports "not pressed" and never touches
/// terminal attributes.
pub struct TerminalController {
    inner: Arc<Inner>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

struct Inner {
    /// True while a caller owns the terminal for line editing (readline-style
    /// input); the background poller stands down during this window so it
    /// doesn't steal bytes meant for the line editor.
    in_prompt_mode: AtomicBool,
    /// Set once the worker should exit (process shutting down / cleanup()).
    stop: AtomicBool,
    esc_at: Mutex<Option<Instant>>,
    sigint_at: Mutex<Option<Instant>>,
    /// No-op mode: not a TTY, or `COGENT_TEST_MODE` is set.
    disabled: bool,
}

impl TerminalController {
    /// Construct a controller and start its background ESC-poll worker.
    ///
    /// Call [`TerminalController::cleanup`] before the process exits (also
    /// safe to rely on `Drop`, but an explicit call lets the crash handler
    /// run it ahead of printing a traceback).
    pub fn new() -> Self {
        let disabled = std::env::var("COGENT_TEST_MODE").is_ok() || !std::io::stdin().is_tty();

        let inner = Arc::new(Inner {
            in_prompt_mode: AtomicBool::new(true),
            stop: AtomicBool::new(false),
            esc_at: Mutex::new(None),
            sigint_at: Mutex::new(None),
            disabled,
        });

        let worker = if disabled {
            None
        } else {
            let worker_inner = Arc::clone(&inner);
            Some(std::thread::spawn(move || poll_loop(worker_inner)))
        };

        Self {
            inner,
            worker: Mutex::new(worker),
        }
    }

    /// Restore cooked-mode terminal attributes so line editing works.
    /// Stands the background poller down for the duration.
    pub fn enter_prompt_mode(&self) {
        if self.inner.disabled {
            return;
        }
        self.inner.in_prompt_mode.store(true, Ordering::SeqCst);
        if terminal::is_raw_mode_enabled().unwrap_or(false) {
            let _ = terminal::disable_raw_mode();
        }
        trace!("entered prompt mode (cooked)");
    }

    /// Switch to cbreak mode (`VMIN=0, VTIME=0` equivalent) and resume the
    /// background ESC poller. Called around long-running operations
    /// (streaming, tool execution) where the caller isn't reading lines.
    pub fn exit_prompt_mode(&self) {
        if self.inner.disabled {
            return;
        }
        let _ = terminal::enable_raw_mode();
        self.inner.in_prompt_mode.store(false, Ordering::SeqCst);
        trace!("exited prompt mode (raw/cbreak)");
    }

    /// Has a lone ESC been observed since the last [`Self::reset_esc_state`]?
    pub fn is_esc_pressed(&self) -> bool {
        self.inner.esc_at.lock().unwrap().is_some()
    }

    /// Has Ctrl-C been observed (only detectable while in raw mode; cooked
    /// mode lets the OS deliver SIGINT normally instead).
    pub fn is_sigint_pressed(&self) -> bool {
        self.inner.sigint_at.lock().unwrap().is_some()
    }

    pub fn reset_esc_state(&self) {
        *self.inner.esc_at.lock().unwrap() = None;
    }

    pub fn reset_sigint_state(&self) {
        *self.inner.sigint_at.lock().unwrap() = None;
    }

    /// Emergency reset equivalent to `stty sane` — unconditionally restores
    /// cooked mode regardless of internal state tracking. Exposed as the
    /// `/debug reset-terminal` control-loop command.
    pub fn stty_sane(&self) {
        let _ = terminal::disable_raw_mode();
        self.inner.in_prompt_mode.store(true, Ordering::SeqCst);
    }

    /// Stop the background worker and restore original terminal attributes
    /// unconditionally. Safe to call multiple times.
    pub fn cleanup(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
        let _ = terminal::disable_raw_mode();
        debug!("terminal controller cleaned up");
    }
}

impl Default for TerminalController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalController {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn poll_loop(inner: Arc<Inner>) {
    while !inner.stop.load(Ordering::SeqCst) {
        if inner.in_prompt_mode.load(Ordering::SeqCst) {
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }

        match event::poll(POLL_INTERVAL) {
            Ok(true) => {}
            _ => continue,
        }

        let Ok(ev) = event::read() else { continue };
        if let Event::Key(key) = ev {
            // crossterm already disambiguates a lone Esc from an
            // escape-prefixed arrow/function-key sequence at the transport
            // layer, so we only need to act on KeyCode::Esc; every other
            // key (including the arrow keys a manual byte parser would have
            // to special-case) is simply not acted on here, which is the
            // "consumed and discarded" behaviour the design calls for.
            match key.code {
                KeyCode::Esc => {
                    *inner.esc_at.lock().unwrap() = Some(Instant::now());
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    *inner.sigint_at.lock().unwrap() = Some(Instant::now());
                }
                _ => {}
            }
        }
    }
}
