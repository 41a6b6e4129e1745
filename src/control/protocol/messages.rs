//! Control protocol message types
//!
//! This module defines every message the session writes to the CLI's stdin.
//! Keys are lower snake case except where the CLI mandates otherwise
//! (`updatedInput`, `toolUseID`); absent optional fields are omitted.

use serde::{Deserialize, Serialize};

use crate::types::identifiers::{RequestId, ToolUseId};

/// Message written to the CLI's stdin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    /// The turn's user message
    User {
        /// Message body
        message: UserMessage,
    },
    /// Answer to a `control_request`
    ControlResponse {
        /// Response envelope
        response: ControlResponse,
    },
}

/// Body of a user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    /// Message role (always `"user"`)
    pub role: String,
    /// Message text
    pub content: String,
}

impl UserMessage {
    /// Create a user-role message
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// `control_response` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlResponse {
    /// The request was handled
    Success {
        /// ID of the request being answered
        request_id: RequestId,
        /// Decision payload
        response: PermissionDecision,
    },
    /// The request kind is not supported by this client
    Error {
        /// ID of the request being answered
        request_id: RequestId,
        /// Reason
        error: String,
    },
}

/// Permission decision payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "lowercase")]
pub enum PermissionDecision {
    /// Let the tool run
    Allow {
        /// Input the tool should run with (echoed or merged)
        #[serde(
            rename = "updatedInput",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        updated_input: Option<serde_json::Value>,
        /// Tool-use correlation ID
        #[serde(rename = "toolUseID", default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<ToolUseId>,
    },
    /// Refuse the tool
    Deny {
        /// Human-readable reason shown to the agent
        message: String,
        /// Tool-use correlation ID
        #[serde(rename = "toolUseID", default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<ToolUseId>,
    },
}
