// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `cogent-mcp` — supervises external MCP (Model Context Protocol) servers
//! over stdio and routes tool calls to whichever server owns the name.
//!
//! This is a directionality reversal from the teacher's MCP crate, which
//! *served* its own tools to an external MCP client (Cursor, Claude Desktop)
//! over stdio using `rmcp`'s server handler. Here `cogent` is itself the MCP
//! *client*: configured servers are spawned as child processes, and their
//! tools appear in the running agent's own tool set alongside the built-ins
//! (spec.md §4.5 / C5).
//!
//! # Handshake
//!
//! For each configured server: spawn the child, send `initialize`, send the
//! `notifications/initialized` notification, then `tools/list` to discover
//! its tools. From then on, `tools/call` requests are routed to the owning
//! child and block until that child responds — calls against the same child
//! are serialized by a per-child write lock; there is no auto-restart if a
//! child dies mid-session (spec.md's explicit Non-goal).
pub mod protocol;
mod server;
pub mod supervisor;

pub use protocol::McpServerConfig;
pub use server::McpServer;
pub use supervisor::McpSupervisor;
