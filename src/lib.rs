//! # Claude Session Controller for Rust
//!
//! Drives the Claude Code CLI as a child process and exposes it as a typed,
//! event-driven session. Every conversational turn runs in its own CLI
//! process that speaks newline-delimited JSON on stdin/stdout; the session
//! threads the remote session ID between turns, routes streaming output and
//! permission prompts, and recovers from stalls, crashes and malformed lines.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kodegen_claude_session::{AgentSession, SessionEvent, SessionOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = SessionOptions::builder()
//!         .cwd("/path/to/project")
//!         .build();
//!
//!     let mut session = AgentSession::new(options)?;
//!     let mut events = session.take_event_receiver().ok_or("receiver taken")?;
//!
//!     session.start(false)?;
//!     session.send_message("What does this project do?").await?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SessionEvent::TextDelta { text } => print!("{text}"),
//!             SessionEvent::PermissionRequested(request) => {
//!                 if request.tool_name.as_str() == "Read" {
//!                     session.allow()?;
//!                 } else {
//!                     session.deny(Some("Only reading is allowed"))?;
//!                 }
//!             }
//!             SessionEvent::TurnCompleted(summary) => {
//!                 println!("\ncost so far: ${:.4}", summary.stats.total_cost_usd);
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     session.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`session`]: [`AgentSession`] and the sans-IO [`SessionMachine`]
//! - [`watchdog`]: inactivity countdown for in-flight turns
//! - [`transport`]: CLI resolution, spawning, line framing, shutdown
//! - [`control`]: encoding of lines written to the CLI
//! - [`message`]: decoding of lines read from the CLI
//! - [`types`]: identifiers, protocol messages, events, options
//! - [`error`]: error types
//!
//! ## Error Handling
//!
//! Operations that are illegal in the current state fail immediately with
//! [`ClaudeError::InvalidState`] or [`ClaudeError::NoPendingPermission`].
//! Everything environmental (missing binary, launch failure, bad lines,
//! crashes) is absorbed into [`SessionState::Error`] and reported through
//! [`SessionEvent::Diagnostic`]; `Error` is always restartable with
//! [`AgentSession::start`].
//!
//! ```no_run
//! # use kodegen_claude_session::{AgentSession, ClaudeError, SessionOptions};
//! # async fn example(session: &AgentSession) {
//! match session.send_message("Hello").await {
//!     Ok(()) => {}
//!     Err(ClaudeError::InvalidState { state, .. }) => {
//!         log::warn!("Session is busy ({state})");
//!     }
//!     Err(e) => log::error!("Error: {e}"),
//! }
//! # }
//! ```
//!
//! ## Requirements
//!
//! - Claude Code: `npm install -g @anthropic-ai/claude-code`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod control;
pub mod error;
pub mod message;
pub mod session;
pub mod transport;
pub mod types;
pub mod watchdog;

// Re-export commonly used types for external API
pub use error::{ClaudeError, Result};
pub use message::{parse_line, parse_message};
pub use session::AgentSession;
pub use session::machine::{Outbox, SessionMachine, WatchdogCommand};
pub use session::turn::{TurnId, TurnPlan};
pub use watchdog::Watchdog;

// Re-export type submodules for flat public API
pub use types::events::{DiagnosticLevel, EventDispatcher, SessionEvent, TurnSummary};
pub use types::identifiers::{RequestId, SessionId, ToolName, ToolUseId};
pub use types::messages::{BlockKind, ContentBlock, Message, ResultMessage, ToolUse, Usage};
pub use types::options::{SessionOptions, SessionOptionsBuilder};
pub use types::permissions::PendingPermission;
pub use types::state::{SessionState, SessionStats};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
