//! Outbound session notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::identifiers::SessionId;
use super::messages::{BlockKind, ContentBlock, ResultMessage, ToolUse};
use super::permissions::PendingPermission;
use super::state::{SessionState, SessionStats};

/// Severity of a diagnostic notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    /// Informational
    Info,
    /// Recoverable problem (bad line, post-hoc non-zero exit, stderr warning)
    Warning,
    /// Failure that moved the session into `Error`
    Error,
}

/// Summary of a completed turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnSummary {
    /// Raw `result` message
    pub result: ResultMessage,
    /// Cumulative stats after folding this result
    pub stats: SessionStats,
    /// When the result was observed
    pub completed_at: DateTime<Utc>,
}

/// Notification pushed to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// State transition
    StateChanged {
        /// Previous state
        from: SessionState,
        /// New state
        to: SessionState,
    },
    /// `start()` armed the session (synthetic, no process involved)
    Initialized {
        /// Whether permission prompts are skipped
        dangerous: bool,
        /// Remote session ID carried over from an earlier run, if any
        session_id: Option<SessionId>,
    },
    /// The agent reported its identity in `system/init`
    SessionInitialized {
        /// Remote session ID
        session_id: Option<SessionId>,
        /// Model serving the session
        model: Option<String>,
        /// Permission mode the CLI runs under
        permission_mode: Option<String>,
    },
    /// A complete assistant message superseding any streamed text
    AssistantMessage {
        /// Authoritative text
        text: String,
        /// Authoritative reasoning
        thinking: String,
        /// Tool invocations
        tool_uses: Vec<ToolUse>,
    },
    /// Streamed text fragment
    TextDelta {
        /// Fragment
        text: String,
    },
    /// Streamed reasoning fragment
    ThinkingDelta {
        /// Fragment
        thinking: String,
    },
    /// A content block opened
    ContentBlockStarted {
        /// Block index within the message
        index: u32,
        /// Block kind
        kind: BlockKind,
        /// Initial block payload
        block: ContentBlock,
    },
    /// A content block closed
    ContentBlockStopped {
        /// Block index within the message
        index: u32,
        /// Kind recorded when the block opened
        kind: Option<BlockKind>,
    },
    /// The agent asks to use a tool
    PermissionRequested(PendingPermission),
    /// The turn finished with a `result`
    TurnCompleted(Box<TurnSummary>),
    /// Diagnostic text (parse failures, stderr warnings, failure causes)
    Diagnostic {
        /// Severity
        level: DiagnosticLevel,
        /// Human-readable text
        message: String,
    },
    /// A turn's process exited
    ProcessExited {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
    },
    /// No output within the inactivity window while working
    InactivityTimeout {
        /// Configured window
        #[serde(with = "crate::types::options::duration_ms")]
        idle: Duration,
    },
}

impl SessionEvent {
    /// Diagnostic shorthand
    pub fn diagnostic(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self::Diagnostic {
            level,
            message: message.into(),
        }
    }
}

/// Caller-supplied notification dispatcher
///
/// Invoked in event order on a dedicated task, outside the session lock.
pub type EventDispatcher = Arc<dyn Fn(SessionEvent) + Send + Sync>;
