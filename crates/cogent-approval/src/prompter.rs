// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The line-prompting seam between the approval engine and the terminal,
//! so the engine's decision logic is testable without a real TTY.
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

/// Asks the user a single-line question and returns their raw answer.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn ask_line(&self, prompt: &str) -> String;
}

/// Reads answers from real stdin, printing `prompt` to stdout first.
/// Blocking stdin I/O is pushed onto a blocking thread so it never stalls
/// the async runtime the rest of the control loop shares.
pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn ask_line(&self, prompt: &str) -> String {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            print!("{prompt}");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_ok() {
                line.trim().to_string()
            } else {
                String::new()
            }
        })
        .await
        .unwrap_or_default()
    }
}

/// Test double that returns a fixed queue of canned answers, one per call.
/// Once the queue is exhausted, every further call returns the empty
/// string (spec treats an empty answer as `deny`, the safest default).
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { answers: Mutex::new(answers.into_iter().map(Into::into).collect()) }
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask_line(&self, _prompt: &str) -> String {
        self.answers.lock().expect("prompter mutex poisoned").pop_front().unwrap_or_default()
    }
}
