//! Type definitions for the Claude session controller
//!
//! This module contains all the type definitions used throughout the crate,
//! organized into logical submodules:
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `ToolName`, `RequestId`, `ToolUseId`)
//! - [`messages`] - Typed protocol messages and content blocks
//! - [`permissions`] - The pending permission request
//! - [`state`] - Session states and cumulative statistics
//! - [`events`] - Outbound notifications
//! - [`options`] - Session configuration

pub mod events;
pub mod identifiers;
pub mod messages;
pub mod options;
pub mod permissions;
pub mod state;

// Re-export commonly used types
pub use events::{DiagnosticLevel, EventDispatcher, SessionEvent, TurnSummary};
pub use identifiers::{RequestId, SessionId, ToolName, ToolUseId};
pub use messages::{BlockKind, ContentBlock, Message, ResultMessage, ToolUse, Usage};
pub use options::{SessionOptions, SessionOptionsBuilder};
pub use permissions::PendingPermission;
pub use state::{SessionState, SessionStats};
