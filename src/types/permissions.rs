//! Permission-related type definitions
//!
//! This module contains the in-flight permission request a session holds
//! while it waits for the caller to allow, deny, or answer a tool use.

use serde::{Deserialize, Serialize};

use super::identifiers::{RequestId, ToolName, ToolUseId};

/// Reason sent to the CLI when a tool use is denied without an explicit one
pub const DEFAULT_DENY_MESSAGE: &str = "The user denied this tool use.";

/// Key under which question answers are merged into a tool's input
pub const ANSWERS_KEY: &str = "answers";

/// Permission request awaiting a caller decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPermission {
    /// Control request ID to echo in the response
    pub request_id: RequestId,
    /// Tool requesting permission
    pub tool_name: ToolName,
    /// Tool-use correlation ID
    pub tool_use_id: Option<ToolUseId>,
    /// Raw tool input
    pub input: serde_json::Value,
}

impl PendingPermission {
    /// Tool input with `answer` recorded under `answers[question]`
    ///
    /// Non-object inputs are replaced by an object holding only the answers.
    #[must_use]
    pub fn input_with_answer(&self, question: &str, answer: &str) -> serde_json::Value {
        let mut input = match &self.input {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };

        let answers = input
            .entry(ANSWERS_KEY)
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if !answers.is_object() {
            *answers = serde_json::Value::Object(serde_json::Map::new());
        }
        if let serde_json::Value::Object(answers) = answers {
            answers.insert(
                question.to_string(),
                serde_json::Value::String(answer.to_string()),
            );
        }

        serde_json::Value::Object(input)
    }
}
