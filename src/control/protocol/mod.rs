//! Control protocol for the CLI's stdin
//!
//! The session writes two kinds of lines to a turn's stdin: the single user
//! message that opens the turn, and `control_response` answers to the CLI's
//! `can_use_tool` permission prompts.
//!
//! # Example: Encoding a user message
//!
//! ```rust
//! use kodegen_claude_session::control::protocol::{encode, user_message};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let line = encode(&user_message("hello"))?;
//! assert!(line.ends_with('\n'));
//!
//! let value: serde_json::Value = serde_json::from_str(line.trim())?;
//! assert_eq!(
//!     value,
//!     serde_json::json!({"type":"user","message":{"role":"user","content":"hello"}})
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Denying a tool use
//!
//! ```rust
//! use kodegen_claude_session::control::protocol::{deny, encode};
//! use kodegen_claude_session::PendingPermission;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pending = PendingPermission {
//!     request_id: "req-1".into(),
//!     tool_name: "Bash".into(),
//!     tool_use_id: Some("toolu_1".into()),
//!     input: serde_json::json!({"command": "rm -rf /"}),
//! };
//! let line = encode(&deny(&pending, "not allowed"))?;
//! assert!(line.contains(r#""behavior":"deny""#));
//! # Ok(())
//! # }
//! ```

mod codec;
mod messages;

// Re-export public types
pub use codec::{allow, deny, encode, unsupported, user_message};
pub use messages::{ControlResponse, OutgoingMessage, PermissionDecision, UserMessage};
