//! Error types and handling
//!
//! This module provides the error types used throughout the Arbor engine.
//! All errors implement the `ArborErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Taxonomy
//!
//! - **NotFound**: `ComponentNotFound`, `ProposalNotFound`
//! - **Unavailable**: `CompletionUnavailable` (never retried, never faked as a pass)
//! - **MalformedResponse**: `MalformedResponse` (degrades to a conservative default upstream)
//! - **ValidationError**: `Validation`, `InvalidToolInput`, `UnknownTool`, `Path*`
//! - **PersistenceError**: `Persistence`, `Io`
//!
//! Error messages never carry secrets. Transport errors are scrubbed before
//! they are wrapped.

use thiserror::Error;

/// Trait for Arbor error extensions
///
/// Provides a user-safe hint and recoverability information for every error.
pub trait ArborErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around by the caller.
    /// Non-recoverable errors need an operator to fix configuration or storage.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{ArborErrorExt, EngineError};
///
/// let error = EngineError::ComponentNotFound("Toggle".to_string());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Persistence("disk full".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Lookup errors
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    // Pipeline transition errors
    #[error("Component {0} is already in a terminal zone")]
    TerminalZone(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    // Completion service errors
    #[error("Completion service unavailable: {0}")]
    CompletionUnavailable(String),

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid input for tool '{tool}': {reason}")]
    InvalidToolInput { tool: String, reason: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    // File system security errors
    #[error("Path denied: {0:?}")]
    PathDenied(std::path::PathBuf),

    #[error("Path outside workspace: {0:?}")]
    PathOutsideWorkspace(std::path::PathBuf),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Caller went away mid-operation
    #[error("Operation cancelled by caller")]
    Cancelled,

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArborErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Persistence(_) => {
                "Could not write to the data directory. Check disk space and permissions"
            }

            Self::ComponentNotFound(_) => "No component matches that id or name",
            Self::ProposalNotFound(_) => "No pending proposal has that id",

            Self::TerminalZone(_) => "Stable components cannot be promoted further",
            Self::InvalidTransition(_) => "That zone change is not allowed",

            Self::CompletionUnavailable(_) => {
                "Completion service unavailable. Check your API key and network"
            }
            Self::MalformedResponse(_) => "The completion service returned an unreadable response",

            Self::Validation(_) => "The request was rejected by validation",
            Self::InvalidToolInput { .. } => "Tool input did not match its schema",
            Self::UnknownTool(_) => "The requested tool is not available",

            Self::PathDenied(_) => "Access to this path is not allowed",
            Self::PathOutsideWorkspace(_) => "Operation must be within workspace",
            Self::PathCanonicalization(_, _) => "Invalid path specified",

            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",

            Self::Cancelled => "The request was cancelled",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_) | Self::Persistence(_) | Self::KeyringError(_) | Self::Io(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
