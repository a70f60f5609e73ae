// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The interactive control loop: wires config, model, tools, approval, and
//! MCP together, then drives the read-submit-render cycle against stdin
//! until the user quits.
mod cli;
mod crash;
mod manifest;
mod project;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use cogent_approval::{ApprovalEngine, Prompter, TerminalPrompter};
use cogent_config::{AgentMode, Config};
use cogent_core::{Agent, AgentEvent, AgentRuntimeContext};
use cogent_mcp::McpSupervisor;
use cogent_model::Message;
use cogent_stats::Stats;
use cogent_term::{Coloriser, TerminalController};
use cogent_tools::{
    EditFileTool, GlobTool, GrepTool, ListDirectoryTool, MemoryTool, PwdTool, ReadFileTool,
    RunShellCommandTool, ToolExecutor, ToolRegistry, WriteFileTool,
};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

const HELP_TEXT: &str = "\
/help               show this message
/quit               exit cogent
/new                start a fresh session (clears history and stats)
/save [path]        save the session (default: session.json)
/load <path>        load a saved session as context for the next turn
/compact            force context compaction now
/model <name>       switch model for subsequent turns
/mode <mode>        switch agent mode (research|plan|agent)
/plan               shortcut for /mode plan
/yolo               toggle YOLO mode (auto-approve everything)
/revoke_approvals   forget every \"approved for this session\" tool decision
/stats              print session statistics
/memory             print the memory file path and its contents
/pprint_messages    dump the raw session message list as JSON
/prompt             print the current system prompt
/breakpoint         print the pending guidance queue
/retry              resubmit the last unanswered turn (after a cancel or transport error)
/debug reset-terminal   force cooked terminal mode (stty sane equivalent)
!<command>          run a shell command locally, without adding it to history";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(command) = &cli.command {
        return run_subcommand(command);
    }

    match run_interactive(cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run_subcommand(command: &Commands) -> anyhow::Result<()> {
    match command {
        Commands::ShowConfig => {
            let config = cogent_config::load(None)?;
            println!("{}", serde_yaml::to_string(&config)?);
        }
        Commands::ListProviders => {
            for d in cogent_model::list_drivers() {
                let key_note = d.default_api_key_env.unwrap_or("none");
                println!("{:<14} {:<20} key={:<20} {}", d.id, d.name, key_note, d.description);
            }
        }
        Commands::ListModels { provider } => {
            for m in cogent_model::catalog::static_catalog().into_iter() {
                if provider.as_deref().is_some_and(|p| p != m.provider) {
                    continue;
                }
                println!(
                    "{:<12} {:<24} context={:<8} output={:<8} {}",
                    m.provider, m.id, m.context_window, m.max_output_tokens, m.name
                );
            }
        }
        Commands::Completions { shell } => {
            cli::print_completions(*shell);
        }
    }
    Ok(())
}

/// Everything saved by `/save` and restored by `/load`, mirroring
/// [`crash::CrashFile`]'s shape.
#[derive(serde::Serialize, serde::Deserialize)]
struct SessionFile {
    messages: Vec<Message>,
    stats: crash::StatsSnapshot,
    timestamp: chrono::DateTime<chrono::Utc>,
    note: Option<String>,
}

async fn run_interactive(cli: Cli) -> anyhow::Result<()> {
    let config = cogent_config::load(cli.config.as_deref())?;
    let config_dir = cogent_config::config_dir();

    let model_cfg = match &cli.model {
        Some(m) => cogent_model::resolve_model_from_config(&config, m),
        None => config.model.clone(),
    };
    let model = cogent_model::from_config(&model_cfg).context("constructing model provider")?;
    let model: Arc<dyn cogent_model::ModelProvider> = Arc::from(model);

    let mode = cli.mode.unwrap_or(config.agent.default_mode);
    let mode_lock = Arc::new(AsyncMutex::new(mode));

    let cwd = std::env::current_dir().context("reading current directory")?;
    let project_root = project::find_project_root(&cwd);
    let runtime = AgentRuntimeContext {
        project_root: project_root.clone(),
        git_context_note: project_root.as_deref().and_then(project::git_context_note),
        ci_context_note: project::ci_context_note(),
        project_context_file: project_root.as_deref().and_then(project::project_context_file),
        append_system_prompt: None,
        system_prompt_override: config.agent.system_prompt.clone(),
    };

    let registry = Arc::new(build_tool_registry(&config));

    let manifest = manifest::load(&manifest::resolve_path(), config.tools.timeout_secs)?;
    let mcp = Arc::new(McpSupervisor::start(&manifest.mcp_servers).await);

    let mut executor = ToolExecutor::new(Arc::clone(&registry));
    for def in manifest.command_tools {
        executor.register_command_tool(def);
    }
    for def in manifest.jsonrpc_tools {
        executor.register_jsonrpc_tool(def);
    }

    let mut approval = ApprovalEngine::new(Arc::new(TerminalPrompter) as Arc<dyn Prompter>);
    approval.load_rule_files_with_inline(
        "run_shell_command",
        &config_dir,
        &config.tools.auto_approve_patterns,
        &config.tools.deny_patterns,
    );
    approval.load_rule_files("write_file", &config_dir);
    approval.load_rule_files("edit_file", &config_dir);
    approval.set_yolo(cli.yolo);
    let approval = Arc::new(approval);

    let executor = executor
        .with_approval_gate(Arc::clone(&approval) as Arc<dyn cogent_tools::ApprovalGate>)
        .with_mcp_router(Arc::clone(&mcp) as Arc<dyn cogent_tools::McpRouter>);

    let max_context_tokens = resolve_context_window(&model_cfg, model_cfg.max_tokens.unwrap_or(4096) as usize);

    let agent_config = Arc::new(config.agent.clone());
    let mut agent = Agent::new(
        Arc::clone(&model),
        Arc::clone(&registry),
        agent_config,
        runtime,
        Arc::clone(&mode_lock),
        max_context_tokens,
    );
    agent.set_executor(Arc::new(executor));

    crash::install_panic_hook();
    let crash_path = crash::path_in(&config_dir);
    match crash::check_and_resolve(&config_dir, ask_line_sync)? {
        crash::Resolution::Reload(messages) => {
            println!("reloaded {} message(s) from the previous crash", messages.len());
            agent.seed_history(messages).await;
        }
        crash::Resolution::Deleted => println!("deleted the previous crash session"),
        crash::Resolution::Ignored | crash::Resolution::None => {}
    }

    if let Some(resume_path) = &cli.resume {
        let messages = load_session_messages(resume_path)?;
        println!("resumed {} message(s) from {}", messages.len(), resume_path.display());
        agent.seed_history(messages).await;
    }

    let term = Arc::new(TerminalController::new());
    let mut stats = Stats::new();
    let session_started = Instant::now();

    if let Some(prompt) = &cli.prompt {
        if let Err(e) = drive_turn(&mut agent, &term, &mut stats, prompt).await {
            eprintln!("error: {e:#}");
        }
        crash::update_snapshot(&crash_path, &agent.session().messages, &stats);
    }

    let exit_code = repl(&mut agent, &term, &mut stats, &approval, &config, &mode_lock, &crash_path, session_started).await?;
    mcp.shutdown_all().await;
    term.cleanup();
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn build_tool_registry(config: &Config) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool);
    registry.register(WriteFileTool);
    registry.register(EditFileTool);
    registry.register(ListDirectoryTool);
    registry.register(RunShellCommandTool { timeout_secs: config.tools.timeout_secs });
    registry.register(GrepTool);
    registry.register(GlobTool);
    registry.register(PwdTool);
    registry.register(MemoryTool { memory_file: config.tools.memory.memory_file.clone() });
    registry
}

/// Context window in tokens for the session budget: the provider catalog's
/// figure if known, else `fallback` (the config's configured `max_tokens`).
fn resolve_context_window(model_cfg: &cogent_config::ModelConfig, fallback: usize) -> usize {
    cogent_model::catalog::lookup(&model_cfg.provider, &model_cfg.name)
        .map(|e| e.context_window as usize)
        .unwrap_or(fallback)
}

fn load_session_messages(path: &std::path::Path) -> anyhow::Result<Vec<Message>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading session file {}", path.display()))?;
    let file: SessionFile =
        serde_json::from_str(&text).with_context(|| format!("parsing session file {}", path.display()))?;
    Ok(file.messages)
}

fn save_session(path: &std::path::Path, messages: &[Message], stats: &Stats, note: Option<String>) -> anyhow::Result<()> {
    let file = SessionFile {
        messages: messages.to_vec(),
        stats: crash::StatsSnapshot::from(stats),
        timestamp: chrono::Utc::now(),
        note,
    };
    let json = serde_json::to_string_pretty(&file)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, json).with_context(|| format!("writing session file {}", path.display()))
}

/// Synchronous line-read helper for the pre-async-loop crash prompt.
fn ask_line_sync(prompt: &str) -> String {
    use std::io::Write;
    print!("{prompt}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_ok() {
        line.trim().to_string()
    } else {
        String::new()
    }
}

#[allow(clippy::too_many_arguments)]
async fn repl(
    agent: &mut Agent,
    term: &Arc<TerminalController>,
    stats: &mut Stats,
    approval: &Arc<ApprovalEngine>,
    config: &Config,
    mode_lock: &Arc<AsyncMutex<AgentMode>>,
    crash_path: &PathBuf,
    session_started: Instant,
) -> anyhow::Result<i32> {
    loop {
        term.enter_prompt_mode();
        print!("> ");
        {
            use std::io::Write;
            let _ = std::io::stdout().flush();
        }

        let mut line = String::new();
        let n = std::io::stdin().read_line(&mut line).unwrap_or(0);
        if n == 0 {
            println!();
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if let Some(shell_cmd) = trimmed.strip_prefix('!') {
            run_shell_escape(shell_cmd);
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('/') {
            match handle_command(rest, agent, term, stats, approval, config, mode_lock, session_started).await {
                CommandResult::Continue => continue,
                CommandResult::Quit(code) => return Ok(code),
            }
        }

        if let Err(e) = drive_turn(agent, term, stats, trimmed).await {
            println!("error: {e:#}");
        }
        crash::update_snapshot(crash_path, &agent.session().messages, stats);
    }

    Ok(0)
}

enum CommandResult {
    Continue,
    Quit(i32),
}

#[allow(clippy::too_many_arguments)]
async fn handle_command(
    rest: &str,
    agent: &mut Agent,
    term: &Arc<TerminalController>,
    stats: &mut Stats,
    approval: &Arc<ApprovalEngine>,
    config: &Config,
    mode_lock: &Arc<AsyncMutex<AgentMode>>,
    session_started: Instant,
) -> CommandResult {
    let mut parts = rest.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("").trim();

    match cmd {
        "help" | "h" | "?" => println!("{HELP_TEXT}"),
        "quit" | "q" | "exit" => return CommandResult::Quit(0),
        "new" => {
            agent.session_mut().replace_messages(Vec::new());
            stats.reset();
            println!("started a new session");
        }
        "save" => {
            let path = if arg.is_empty() { PathBuf::from("session.json") } else { PathBuf::from(arg) };
            match save_session(&path, &agent.session().messages, stats, None) {
                Ok(()) => println!("saved session to {}", path.display()),
                Err(e) => println!("error saving session: {e:#}"),
            }
        }
        "load" => {
            if arg.is_empty() {
                println!("usage: /load <path>");
            } else {
                match load_session_messages(std::path::Path::new(arg)) {
                    Ok(messages) => {
                        println!("loaded {} message(s) from {arg}", messages.len());
                        agent.seed_history(messages).await;
                    }
                    Err(e) => println!("error loading session: {e:#}"),
                }
            }
        }
        "compact" => {
            let (tx, mut rx) = mpsc::channel(16);
            let mode = *mode_lock.lock().await;
            let compact_result = agent.compact_now(&tx, mode).await;
            drop(tx);
            drain_compaction_notice(&mut rx, stats).await;
            if let Err(e) = compact_result {
                println!("error compacting: {e:#}");
            }
        }
        "model" => {
            if arg.is_empty() {
                println!("usage: /model <name>");
            } else {
                let model_cfg = cogent_model::resolve_model_from_config(config, arg);
                match cogent_model::from_config(&model_cfg) {
                    Ok(provider) => {
                        agent.set_model(Arc::from(provider));
                        println!("switched model to {arg}");
                    }
                    Err(e) => println!("error switching model: {e:#}"),
                }
            }
        }
        "mode" => {
            if let Some(m) = parse_mode(arg) {
                *mode_lock.lock().await = m;
                println!("switched to {m} mode");
            } else {
                println!("usage: /mode <research|plan|agent>");
            }
        }
        "plan" => {
            *mode_lock.lock().await = AgentMode::Plan;
            println!("switched to plan mode");
        }
        "yolo" => {
            let now_on = !approval.is_yolo();
            approval.set_yolo(now_on);
            println!("yolo mode is now {}", if now_on { "on" } else { "off" });
        }
        "revoke_approvals" => {
            approval.revoke_all_approvals();
            println!("revoked every session-cached tool approval");
        }
        "stats" => {
            let session = agent.session();
            let context = Some((session.token_count, session.max_tokens));
            print!("{}", stats.render(session_started.elapsed(), context));
        }
        "memory" => {
            let path = config.tools.memory.memory_file.clone().unwrap_or_else(|| "COGENT_MEMORY.md".to_string());
            match std::fs::read_to_string(&path) {
                Ok(text) => println!("{path}:\n{text}"),
                Err(_) => println!("{path}: (empty or not found)"),
            }
        }
        "pprint_messages" => match serde_json::to_string_pretty(&agent.session().messages) {
            Ok(json) => println!("{json}"),
            Err(e) => println!("error serializing messages: {e:#}"),
        },
        "prompt" => {
            let mode = *mode_lock.lock().await;
            println!("{}", agent.current_system_message(mode).as_text().unwrap_or_default());
        }
        "breakpoint" => {
            let guidance = approval.drain_guidance();
            println!("pending guidance entries: {}", guidance.len());
            for g in guidance {
                println!("  - {g}");
            }
        }
        "debug" => {
            if arg == "reset-terminal" {
                term.stty_sane();
                println!("terminal reset to cooked mode");
            } else {
                println!("usage: /debug reset-terminal");
            }
        }
        "retry" => {
            if let Err(e) = drive_retry(agent, term, stats).await {
                println!("error: {e:#}");
            }
        }
        other => println!("unknown command: /{other} (try /help)"),
    }

    CommandResult::Continue
}

async fn drain_compaction_notice(rx: &mut mpsc::Receiver<AgentEvent>, stats: &mut Stats) {
    while let Some(ev) = rx.recv().await {
        if let AgentEvent::ContextCompacted { tokens_before, tokens_after, .. } = ev {
            stats.record_compaction();
            println!("compacted context: {tokens_before} -> {tokens_after} tokens");
        }
    }
}

fn parse_mode(arg: &str) -> Option<AgentMode> {
    match arg.to_lowercase().as_str() {
        "research" => Some(AgentMode::Research),
        "plan" => Some(AgentMode::Plan),
        "agent" => Some(AgentMode::Agent),
        _ => None,
    }
}

fn run_shell_escape(command: &str) {
    let status = std::process::Command::new("sh").arg("-c").arg(command).status();
    match status {
        Ok(status) => println!("[exit {}]", status.code().unwrap_or(-1)),
        Err(e) => println!("error running command: {e}"),
    }
}

/// Drives one user turn: streams [`AgentEvent`]s to the terminal while a
/// background watcher polls the terminal controller for ESC/Ctrl-C and
/// wires that into the agent's cooperative cancellation channel.
async fn drive_turn(agent: &mut Agent, term: &Arc<TerminalController>, stats: &mut Stats, user_input: &str) -> anyhow::Result<()> {
    term.exit_prompt_mode();
    term.reset_esc_state();
    term.reset_sigint_state();

    let (tx, mut rx) = mpsc::channel(64);
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let watcher = tokio::spawn(cancel_watcher(Arc::clone(term), cancel_tx));

    let turn_started = Instant::now();

    let submit_fut = agent.submit_with_cancel(user_input, tx, cancel_rx);
    let render_fut = async {
        let mut thinking_open = false;
        let mut coloriser = Coloriser::new();
        while let Some(ev) = rx.recv().await {
            render_event(ev, stats, &mut thinking_open, &mut coloriser);
        }
    };
    let (result, ()) = tokio::join!(submit_fut, render_fut);

    watcher.abort();
    stats.api_time_spent += turn_started.elapsed();
    term.enter_prompt_mode();
    result
}

/// Like [`drive_turn`] but resubmits the existing session history instead of
/// appending a new user message — backs the `/retry` command for resuming
/// after a cancelled or transport-failed turn.
async fn drive_retry(agent: &mut Agent, term: &Arc<TerminalController>, stats: &mut Stats) -> anyhow::Result<()> {
    term.exit_prompt_mode();
    term.reset_esc_state();
    term.reset_sigint_state();

    let (tx, mut rx) = mpsc::channel(64);
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let watcher = tokio::spawn(cancel_watcher(Arc::clone(term), cancel_tx));

    let turn_started = Instant::now();

    let submit_fut = agent.retry_with_cancel(tx, cancel_rx);
    let render_fut = async {
        let mut thinking_open = false;
        let mut coloriser = Coloriser::new();
        while let Some(ev) = rx.recv().await {
            render_event(ev, stats, &mut thinking_open, &mut coloriser);
        }
    };
    let (result, ()) = tokio::join!(submit_fut, render_fut);

    watcher.abort();
    stats.api_time_spent += turn_started.elapsed();
    term.enter_prompt_mode();
    result
}

async fn cancel_watcher(term: Arc<TerminalController>, cancel_tx: oneshot::Sender<()>) {
    let mut cancel_tx = Some(cancel_tx);
    loop {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if term.is_esc_pressed() || term.is_sigint_pressed() {
            if let Some(tx) = cancel_tx.take() {
                let _ = tx.send(());
            }
            break;
        }
    }
}

fn render_event(event: AgentEvent, stats: &mut Stats, thinking_open: &mut bool, coloriser: &mut Coloriser) {
    use std::io::Write;
    match event {
        AgentEvent::TextDelta(chunk) => {
            if *thinking_open {
                println!();
                *thinking_open = false;
            }
            print!("{}", coloriser.feed(&chunk));
            let _ = std::io::stdout().flush();
        }
        AgentEvent::TextComplete(_) => {
            print!("{}", coloriser.finish());
            println!();
        }
        AgentEvent::ThinkingDelta(chunk) => {
            if !*thinking_open {
                print!("\x1b[2m");
                *thinking_open = true;
            }
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        }
        AgentEvent::ThinkingComplete(_) => {
            if *thinking_open {
                println!("\x1b[0m");
                *thinking_open = false;
            }
        }
        AgentEvent::ToolCallStarted(call) => {
            println!("\n→ {}({})", call.name, call.args);
        }
        AgentEvent::ToolCallFinished { tool_name, output, is_error, .. } => {
            stats.record_tool_call(Duration::ZERO, is_error);
            let marker = if is_error { "\u{2717}" } else { "\u{2713}" };
            println!("{marker} {tool_name}: {output}");
        }
        AgentEvent::ContextCompacted { tokens_before, tokens_after, .. } => {
            stats.record_compaction();
            println!("\n[context compacted: {tokens_before} -> {tokens_after} tokens]");
        }
        AgentEvent::TokenUsage { input, output, cache_read, cache_write, .. } => {
            stats.record_api_request_started();
            stats.record_api_success(Duration::ZERO, input as u64, output as u64);
            stats.set_current_prompt_size(input as usize);
            let _ = (cache_read, cache_write);
        }
        AgentEvent::TurnComplete => {}
        AgentEvent::Aborted { partial_text } => {
            let _ = partial_text;
            let tail = coloriser.finish();
            if !tail.is_empty() {
                print!("{tail}");
            }
            println!("\n[cancelled]");
        }
        AgentEvent::Error(msg) => {
            stats.record_api_error(Duration::ZERO);
            println!("\nerror: {msg}");
        }
        AgentEvent::ModeChanged(mode) => println!("\n[mode changed to {mode}]"),
        AgentEvent::ToolsCancelled => println!("\n[remaining tool calls in this batch were cancelled]"),
    }
}
