//! Arbor Engine Library
//!
//! Governance engine for design components: a fixed zone pipeline, zone
//! approval rules, multi-agent review, append-only ledgers and a bounded
//! tool loop for conversational clients. Used by the `arbor` binary and the
//! integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// File system security module
pub mod fs_guard;

/// Telemetry and Observability
pub mod telemetry;

/// Append-only JSONL ledgers
pub mod ledger;

/// Zone approval rules
pub mod rules;

/// Component pipeline state machine
pub mod pipeline;

/// Veto overrides, gated promotion and proposals
pub mod governance;

/// Completion service abstraction layer
pub mod llm;

/// Multi-agent review
pub mod review;

/// Conversational tool loop
pub mod chat;

/// Owned engine context
pub mod context;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
