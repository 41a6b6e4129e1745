//! Message-related type definitions
//!
//! This module contains the typed form of every NDJSON line the CLI writes to
//! its standard output. Decoding from raw lines lives in
//! [`message::parser`](crate::message::parser).

use serde::{Deserialize, Serialize};

use super::identifiers::{RequestId, SessionId, ToolName, ToolUseId};

// ============================================================================
// Content Blocks
// ============================================================================

/// Kind of a content block, derived from its `type` tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Plain assistant text
    Text,
    /// Extended thinking / reasoning
    Thinking,
    /// Tool invocation
    ToolUse,
    /// Any block kind this crate does not know about yet
    Other(String),
}

impl BlockKind {
    /// Map a wire `type` tag onto a block kind
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "text" => Self::Text,
            "thinking" | "redacted_thinking" => Self::Thinking,
            "tool_use" | "server_tool_use" => Self::ToolUse,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Generic content block
///
/// Blocks are decoded loosely so new block kinds never break decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Wire `type` tag (`text`, `thinking`, `tool_use`, ...)
    #[serde(rename = "type")]
    pub block_type: String,
    /// Text content for `text` blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Reasoning content for `thinking` blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Tool-use ID for `tool_use` blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name for `tool_use` blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool input for `tool_use` blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

impl ContentBlock {
    /// Kind of this block
    #[must_use]
    pub fn kind(&self) -> BlockKind {
        BlockKind::from_tag(&self.block_type)
    }
}

/// Tool invocation carried by a completed assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    /// Tool-use ID
    pub id: ToolUseId,
    /// Tool name
    pub name: ToolName,
    /// Tool input
    pub input: serde_json::Value,
}

// ============================================================================
// Top-level Messages
// ============================================================================

/// `system` message; subtype `init` opens every turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMessage {
    /// System message subtype (`init`, `compact_boundary`, ...)
    #[serde(default)]
    pub subtype: String,
    /// Remote session ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Model serving the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Permission mode the CLI runs under
    #[serde(
        default,
        rename = "permissionMode",
        skip_serializing_if = "Option::is_none"
    )]
    pub permission_mode: Option<String>,
}

impl SystemMessage {
    /// Whether this is the per-turn `init` message
    #[must_use]
    pub fn is_init(&self) -> bool {
        self.subtype == "init"
    }
}

/// Body of an `assistant` message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantBody {
    /// Model that generated the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Message content blocks
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// Complete `assistant` message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Message body
    pub message: AssistantBody,
    /// Parent tool use ID for nested (sub-agent) conversations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    /// Remote session ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl AssistantMessage {
    /// Concatenated text of all `text` blocks
    #[must_use]
    pub fn text(&self) -> String {
        self.collect(BlockKind::Text, |b| b.text.as_deref())
    }

    /// Concatenated reasoning of all `thinking` blocks
    #[must_use]
    pub fn thinking(&self) -> String {
        self.collect(BlockKind::Thinking, |b| b.thinking.as_deref())
    }

    /// Tool invocations carried by this message
    #[must_use]
    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.message
            .content
            .iter()
            .filter(|b| b.kind() == BlockKind::ToolUse)
            .map(|b| ToolUse {
                id: ToolUseId::new(b.id.clone().unwrap_or_default()),
                name: ToolName::new(b.name.clone().unwrap_or_default()),
                input: b.input.clone().unwrap_or(serde_json::Value::Null),
            })
            .collect()
    }

    fn collect(&self, kind: BlockKind, field: impl Fn(&ContentBlock) -> Option<&str>) -> String {
        self.message
            .content
            .iter()
            .filter(|b| b.kind() == kind)
            .filter_map(field)
            .collect()
    }
}

/// Incremental delta inside a `content_block_delta` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    /// Plain text fragment
    TextDelta {
        /// Text fragment
        text: String,
    },
    /// Reasoning fragment
    ThinkingDelta {
        /// Reasoning fragment
        thinking: String,
    },
    /// Tool input JSON fragment, signatures, and future delta kinds
    #[serde(other)]
    Other,
}

/// Raw Anthropic streaming event wrapped in a `stream_event` line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A new content block opens
    ContentBlockStart {
        /// Block index within the message
        #[serde(default)]
        index: u32,
        /// Initial (usually empty) block
        content_block: ContentBlock,
    },
    /// Content block fragment
    ContentBlockDelta {
        /// Block index within the message
        #[serde(default)]
        index: u32,
        /// Fragment
        delta: Delta,
    },
    /// A content block closes
    ContentBlockStop {
        /// Block index within the message
        #[serde(default)]
        index: u32,
    },
    /// A new assistant message begins streaming
    MessageStart,
    /// `message_delta`, `message_stop`, `ping`, and future event kinds
    #[serde(other)]
    Other,
}

/// `stream_event` line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEventMessage {
    /// Streaming event
    pub event: StreamEvent,
    /// Parent tool use ID for nested conversations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

/// Token usage counters reported by a `result` message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Uncached input tokens
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u64,
    /// Input tokens written to the prompt cache
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    /// Input tokens read from the prompt cache
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// Terminal `result` message of a turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMessage {
    /// Result subtype (`success`, `error_max_turns`, ...)
    #[serde(default)]
    pub subtype: String,
    /// Whether the turn ended in error
    #[serde(default)]
    pub is_error: bool,
    /// Total duration in milliseconds
    #[serde(default)]
    pub duration_ms: u64,
    /// API call duration in milliseconds
    #[serde(default)]
    pub duration_api_ms: u64,
    /// Number of agent turns used
    #[serde(default)]
    pub num_turns: u32,
    /// Remote session ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Total cost in USD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Final result text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Embedded error strings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Body of a `control_request`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlRequestBody {
    /// Permission prompt routed through stdio
    CanUseTool {
        /// Tool requesting permission
        tool_name: ToolName,
        /// Raw tool input
        #[serde(default)]
        input: serde_json::Value,
        /// Tool-use correlation ID
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<ToolUseId>,
    },
    /// Hook callbacks, MCP messages, and future request kinds
    #[serde(other)]
    Unsupported,
}

/// `control_request` line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequestMessage {
    /// Request ID to echo in the response
    pub request_id: RequestId,
    /// Request body
    pub request: ControlRequestBody,
}

/// Decoded protocol message
#[derive(Debug, Clone)]
pub enum Message {
    /// `system` message
    System(SystemMessage),
    /// Complete `assistant` message
    Assistant(AssistantMessage),
    /// Partial-message `stream_event`
    StreamEvent(StreamEventMessage),
    /// Terminal `result` message
    Result(ResultMessage),
    /// `control_request` from the CLI
    ControlRequest(ControlRequestMessage),
    /// Any other `type` (e.g. echoed `user` tool results); ignored
    Unknown {
        /// The unrecognized `type` value
        message_type: String,
    },
}

impl Message {
    /// Wire `type` tag of this message
    #[must_use]
    pub fn message_type(&self) -> &str {
        match self {
            Self::System(_) => "system",
            Self::Assistant(_) => "assistant",
            Self::StreamEvent(_) => "stream_event",
            Self::Result(_) => "result",
            Self::ControlRequest(_) => "control_request",
            Self::Unknown { message_type } => message_type,
        }
    }
}
