// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod executor;
pub mod registry;
pub mod tool;

pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{ApprovalPolicy, OutputCategory, Tool, ToolCall, ToolOutput, ToolOutputPart};

pub use builtin::edit_file::EditFileTool;
pub use builtin::file_tracker::FileTracker;
pub use builtin::glob::GlobTool;
pub use builtin::grep::GrepTool;
pub use builtin::list_dir::ListDirectoryTool;
pub use builtin::memory::MemoryTool;
pub use builtin::pwd::PwdTool;
pub use builtin::read_file::ReadFileTool;
pub use builtin::shell::RunShellCommandTool;
pub use builtin::write_file::WriteFileTool;

pub use executor::{
    ApprovalGate, ApprovalOutcome, AutoApproveGate, CommandToolDefinition, DispatchKind,
    JsonRpcToolDefinition, McpRouter, ToolExecutor,
};
