//! Encoding of outgoing protocol lines

use crate::error::{ClaudeError, Result};
use crate::types::identifiers::RequestId;
use crate::types::permissions::PendingPermission;

use super::messages::{ControlResponse, OutgoingMessage, PermissionDecision, UserMessage};

/// Serialize a message as one NDJSON line (with trailing newline)
///
/// # Errors
/// Returns error if JSON serialization fails
pub fn encode(message: &OutgoingMessage) -> Result<String> {
    serde_json::to_string(message)
        .map(|s| format!("{s}\n"))
        .map_err(ClaudeError::from)
}

/// User message opening a turn
#[must_use]
pub fn user_message(text: impl Into<String>) -> OutgoingMessage {
    OutgoingMessage::User {
        message: UserMessage::new(text),
    }
}

/// Allow response for `pending`, running the tool with `updated_input`
#[must_use]
pub fn allow(pending: &PendingPermission, updated_input: serde_json::Value) -> OutgoingMessage {
    success(
        pending.request_id.clone(),
        PermissionDecision::Allow {
            updated_input: Some(updated_input),
            tool_use_id: pending.tool_use_id.clone(),
        },
    )
}

/// Deny response for `pending`
#[must_use]
pub fn deny(pending: &PendingPermission, message: impl Into<String>) -> OutgoingMessage {
    success(
        pending.request_id.clone(),
        PermissionDecision::Deny {
            message: message.into(),
            tool_use_id: pending.tool_use_id.clone(),
        },
    )
}

/// Error response for a control request this client does not handle
#[must_use]
pub fn unsupported(request_id: RequestId, error: impl Into<String>) -> OutgoingMessage {
    OutgoingMessage::ControlResponse {
        response: ControlResponse::Error {
            request_id,
            error: error.into(),
        },
    }
}

fn success(request_id: RequestId, decision: PermissionDecision) -> OutgoingMessage {
    OutgoingMessage::ControlResponse {
        response: ControlResponse::Success {
            request_id,
            response: decision,
        },
    }
}
