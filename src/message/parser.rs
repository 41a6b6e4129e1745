//! Message parser for Claude Code stream-json output

use serde::de::DeserializeOwned;

use crate::error::{ClaudeError, Result};
use crate::types::messages::Message;

/// Parse one stdout line into a typed [`Message`]
///
/// Blank lines yield `Ok(None)`. Lines whose `type` is not one of the
/// recognized kinds yield [`Message::Unknown`] rather than an error.
///
/// # Errors
/// Returns `ClaudeError::MessageParse` if the line is not a JSON object or a
/// recognized message kind has the wrong shape
pub fn parse_line(line: &str) -> Result<Option<Message>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let data: serde_json::Value = serde_json::from_str(line).map_err(|e| {
        ClaudeError::message_parse(format!("Invalid JSON: {e}"), Some(line.to_string()))
    })?;

    parse_message(data)
        .map(Some)
        .map_err(|e| match e {
            ClaudeError::MessageParse { message, .. } => {
                ClaudeError::message_parse(message, Some(line.to_string()))
            }
            other => other,
        })
}

/// Parse a JSON value into a typed [`Message`]
///
/// # Arguments
/// * `data` - Raw JSON value from CLI output
///
/// # Errors
/// Returns `ClaudeError::MessageParse` if the value is not an object, has no
/// string `type`, or a recognized kind fails to decode
pub fn parse_message(data: serde_json::Value) -> Result<Message> {
    let Some(message_type) = data
        .get("type")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
    else {
        return Err(ClaudeError::message_parse(
            "Message has no string `type` field",
            None,
        ));
    };

    let message = match message_type.as_str() {
        "system" => Message::System(decode(&message_type, data)?),
        "assistant" => Message::Assistant(decode(&message_type, data)?),
        "stream_event" => Message::StreamEvent(decode(&message_type, data)?),
        "result" => Message::Result(decode(&message_type, data)?),
        "control_request" => Message::ControlRequest(decode(&message_type, data)?),
        _ => Message::Unknown { message_type },
    };

    Ok(message)
}

fn decode<T: DeserializeOwned>(message_type: &str, data: serde_json::Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| {
        ClaudeError::message_parse(format!("Malformed `{message_type}` message: {e}"), None)
    })
}
