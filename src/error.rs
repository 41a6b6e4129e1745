//! Error types for the Claude session controller

use thiserror::Error;

use crate::types::state::SessionState;

/// Main error type for the Claude session controller
///
/// Only the caller-misuse variants ([`ClaudeError::InvalidState`],
/// [`ClaudeError::NoPendingPermission`], [`ClaudeError::SessionDisposed`]) are
/// ever returned from [`AgentSession`](crate::AgentSession) methods. The
/// environmental variants are folded into session state and reported as
/// [`SessionEvent`](crate::SessionEvent)s.
#[derive(Error, Debug)]
pub enum ClaudeError {
    /// Claude Code CLI not found or not callable
    #[error("Claude Code CLI not available: {0}")]
    CliNotFound(String),

    /// The child process could not be started
    #[error("Failed to launch Claude Code: {0}")]
    Launch(String),

    /// Process exited abnormally
    #[error("Process error (exit code {exit_code:?}): {message}")]
    Process {
        /// Error message
        message: String,
        /// Process exit code, `None` when killed by a signal
        exit_code: Option<i32>,
        /// Tail of the standard error output
        stderr: Option<String>,
    },

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol line that could not be decoded
    #[error("Message parse error: {message}")]
    MessageParse {
        /// Error message
        message: String,
        /// Raw line that failed to parse
        line: Option<String>,
    },

    /// Output stream ended before the turn produced a result
    #[error("Output stream ended unexpectedly: {0}")]
    StreamEnded(String),

    /// Reading from or writing to the child failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation is not legal in the current session state
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// The rejected operation
        operation: &'static str,
        /// State the session was in
        state: SessionState,
    },

    /// Permission resolution requested with nothing pending
    #[error("No permission request is pending")]
    NoPendingPermission,

    /// Session was already disposed
    #[error("Session has been disposed")]
    SessionDisposed,
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, ClaudeError>;

impl ClaudeError {
    /// Create a CLI not found error
    #[must_use]
    pub fn cli_not_found(cli: &std::path::Path) -> Self {
        Self::CliNotFound(format!(
            "`{} --version` did not succeed. Install with:\n\
             npm install -g @anthropic-ai/claude-code\n\
             \n\
             or point `cli_path` at an existing installation",
            cli.display()
        ))
    }

    /// Create a launch error
    pub fn launch(msg: impl Into<String>) -> Self {
        Self::Launch(msg.into())
    }

    /// Create a process error
    pub fn process(msg: impl Into<String>, exit_code: Option<i32>, stderr: Option<String>) -> Self {
        Self::Process {
            message: msg.into(),
            exit_code,
            stderr,
        }
    }

    /// Create a message parse error
    pub fn message_parse(msg: impl Into<String>, line: Option<String>) -> Self {
        Self::MessageParse {
            message: msg.into(),
            line,
        }
    }

    /// Create a stream-ended error
    pub fn stream_ended(msg: impl Into<String>) -> Self {
        Self::StreamEnded(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid state error
    #[must_use]
    pub const fn invalid_state(operation: &'static str, state: SessionState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Whether this error reports a caller bug rather than an environmental failure
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. } | Self::NoPendingPermission | Self::SessionDisposed
        )
    }
}
