// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

/// Interactive, terminal-based AI coding assistant.
///
/// Run with no arguments to start an interactive session in the current
/// directory. Pass an initial prompt as a positional argument to seed the
/// first user turn before dropping into the interactive loop.
#[derive(Parser, Debug)]
#[command(name = "cogent", version, about, long_about = None)]
pub struct Cli {
    /// Initial user message. If omitted, the session starts idle and waits
    /// for the first line on stdin.
    pub prompt: Option<String>,

    /// Path to an explicit config file (overrides the discovered layers).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Model to use, as "provider/name", a bare provider id, a bare model
    /// name, or a key from `providers:` in config.
    #[arg(long, short = 'm', env = "COGENT_MODEL")]
    pub model: Option<String>,

    /// Auto-approve every tool except those matched by an `auto_deny` rule
    /// file. Equivalent to the `/yolo` in-session command.
    #[arg(long, env = "YOLO_MODE")]
    pub yolo: bool,

    /// Resume a previously saved session file instead of starting empty.
    #[arg(long, short = 'r')]
    pub resume: Option<PathBuf>,

    /// Agent mode to start in.
    #[arg(long, value_enum)]
    pub mode: Option<cogent_config::AgentMode>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the fully merged configuration (all layers applied) and exit.
    ShowConfig,

    /// List every recognised model-provider driver id.
    ListProviders,

    /// List known models for a provider (or all providers if omitted).
    ListModels {
        /// Restrict the listing to this provider id.
        provider: Option<String>,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
