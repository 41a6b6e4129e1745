//! Unit tests for message parser
//!
//! Tests the decoding of stream-json lines into typed Message objects

use kodegen_claude_session::types::messages::{ControlRequestBody, Delta, StreamEvent};
use kodegen_claude_session::{BlockKind, ClaudeError, Message, parse_line, parse_message};
use serde_json::json;

#[test]
fn test_blank_lines_are_skipped() {
    assert!(parse_line("").unwrap().is_none());
    assert!(parse_line("   \r").unwrap().is_none());
}

#[test]
fn test_unknown_type_is_not_an_error() {
    let message = parse_message(json!({"type": "user", "message": {"role": "user"}})).unwrap();
    match message {
        Message::Unknown { message_type } => assert_eq!(message_type, "user"),
        other => panic!("Wrong message type: {other:?}"),
    }

    let message = parse_line(r#"{"type":"brand_new_kind","payload":[1,2,3]}"#)
        .unwrap()
        .unwrap();
    assert_eq!(message.message_type(), "brand_new_kind");
}

#[test]
fn test_malformed_line_keeps_raw_text() {
    let err = parse_line("{not json").unwrap_err();
    match err {
        ClaudeError::MessageParse { line, .. } => assert_eq!(line.as_deref(), Some("{not json")),
        other => panic!("Wrong error: {other:?}"),
    }
}

#[test]
fn test_missing_type_is_a_parse_error() {
    assert!(matches!(
        parse_line(r#"{"subtype":"init"}"#),
        Err(ClaudeError::MessageParse { .. })
    ));
    assert!(parse_line("[1,2]").is_err());
}

#[test]
fn test_parse_system_init() {
    let line = r#"{"type":"system","subtype":"init","session_id":"abc123","model":"claude-sonnet-4-5","permissionMode":"default","tools":["Bash"],"cwd":"/tmp"}"#;
    match parse_line(line).unwrap().unwrap() {
        Message::System(system) => {
            assert!(system.is_init());
            assert_eq!(system.session_id.unwrap().as_str(), "abc123");
            assert_eq!(system.model.as_deref(), Some("claude-sonnet-4-5"));
            assert_eq!(system.permission_mode.as_deref(), Some("default"));
        }
        other => panic!("Wrong message type: {other:?}"),
    }
}

#[test]
fn test_parse_assistant_blocks() {
    let data = json!({
        "type": "assistant",
        "message": {
            "model": "claude-sonnet-4-5",
            "content": [
                {"type": "thinking", "thinking": "Let me look.", "signature": "sig"},
                {"type": "text", "text": "Listing files."},
                {"type": "tool_use", "id": "toolu_1", "name": "Bash", "input": {"command": "ls"}},
                {"type": "image", "source": {"type": "base64"}}
            ]
        },
        "parent_tool_use_id": null,
        "session_id": "abc123"
    });

    match parse_message(data).unwrap() {
        Message::Assistant(assistant) => {
            assert_eq!(assistant.text(), "Listing files.");
            assert_eq!(assistant.thinking(), "Let me look.");

            let tools = assistant.tool_uses();
            assert_eq!(tools.len(), 1);
            assert_eq!(tools[0].name.as_str(), "Bash");
            assert_eq!(tools[0].id.as_str(), "toolu_1");
            assert_eq!(tools[0].input, json!({"command": "ls"}));

            assert_eq!(
                assistant.message.content[3].kind(),
                BlockKind::Other("image".to_string())
            );
        }
        other => panic!("Wrong message type: {other:?}"),
    }
}

#[test]
fn test_parse_stream_deltas() {
    let text = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"Hel"}}}"#;
    match parse_line(text).unwrap().unwrap() {
        Message::StreamEvent(stream) => assert_eq!(
            stream.event,
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: Delta::TextDelta {
                    text: "Hel".to_string()
                }
            }
        ),
        other => panic!("Wrong message type: {other:?}"),
    }

    let thinking = json!({
        "type": "stream_event",
        "event": {"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "hmm"}}
    });
    match parse_message(thinking).unwrap() {
        Message::StreamEvent(stream) => assert!(matches!(
            stream.event,
            StreamEvent::ContentBlockDelta { delta: Delta::ThinkingDelta { .. }, .. }
        )),
        other => panic!("Wrong message type: {other:?}"),
    }

    let json_delta = json!({
        "type": "stream_event",
        "event": {"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": "{\"co"}}
    });
    match parse_message(json_delta).unwrap() {
        Message::StreamEvent(stream) => assert!(matches!(
            stream.event,
            StreamEvent::ContentBlockDelta { delta: Delta::Other, .. }
        )),
        other => panic!("Wrong message type: {other:?}"),
    }
}

#[test]
fn test_parse_block_start_and_unknown_events() {
    let start = json!({
        "type": "stream_event",
        "event": {"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}
    });
    match parse_message(start).unwrap() {
        Message::StreamEvent(stream) => match stream.event {
            StreamEvent::ContentBlockStart { index, content_block } => {
                assert_eq!(index, 0);
                assert_eq!(content_block.kind(), BlockKind::Thinking);
            }
            other => panic!("Wrong event: {other:?}"),
        },
        other => panic!("Wrong message type: {other:?}"),
    }

    let ping = json!({"type": "stream_event", "event": {"type": "ping"}});
    match parse_message(ping).unwrap() {
        Message::StreamEvent(stream) => assert_eq!(stream.event, StreamEvent::Other),
        other => panic!("Wrong message type: {other:?}"),
    }
}

#[test]
fn test_parse_result() {
    let data = json!({
        "type": "result",
        "subtype": "success",
        "is_error": false,
        "duration_ms": 1200,
        "duration_api_ms": 900,
        "num_turns": 2,
        "session_id": "abc123",
        "total_cost_usd": 0.0125,
        "usage": {
            "input_tokens": 10,
            "output_tokens": 20,
            "cache_creation_input_tokens": 30,
            "cache_read_input_tokens": 40
        },
        "result": "Done"
    });

    match parse_message(data).unwrap() {
        Message::Result(result) => {
            assert_eq!(result.subtype, "success");
            assert_eq!(result.num_turns, 2);
            assert_eq!(result.total_cost_usd, Some(0.0125));
            let usage = result.usage.unwrap();
            assert_eq!(usage.cache_read_input_tokens, 40);
            assert!(result.errors.is_empty());
        }
        other => panic!("Wrong message type: {other:?}"),
    }
}

#[test]
fn test_parse_error_result_with_errors() {
    let data = json!({
        "type": "result",
        "subtype": "error_during_execution",
        "is_error": true,
        "errors": ["API overloaded"]
    });
    match parse_message(data).unwrap() {
        Message::Result(result) => {
            assert!(result.is_error);
            assert_eq!(result.errors, vec!["API overloaded".to_string()]);
        }
        other => panic!("Wrong message type: {other:?}"),
    }
}

#[test]
fn test_parse_can_use_tool() {
    let data = json!({
        "type": "control_request",
        "request_id": "req-1",
        "request": {
            "subtype": "can_use_tool",
            "tool_name": "Bash",
            "input": {"command": "rm -rf build"},
            "tool_use_id": "toolu_9",
            "permission_suggestions": []
        }
    });

    match parse_message(data).unwrap() {
        Message::ControlRequest(request) => {
            assert_eq!(request.request_id.as_str(), "req-1");
            match request.request {
                ControlRequestBody::CanUseTool {
                    tool_name,
                    input,
                    tool_use_id,
                } => {
                    assert_eq!(tool_name.as_str(), "Bash");
                    assert_eq!(input["command"], "rm -rf build");
                    assert_eq!(tool_use_id.unwrap().as_str(), "toolu_9");
                }
                ControlRequestBody::Unsupported => panic!("Wrong request body"),
            }
        }
        other => panic!("Wrong message type: {other:?}"),
    }
}

#[test]
fn test_parse_unsupported_control_request() {
    let data = json!({
        "type": "control_request",
        "request_id": "req-2",
        "request": {"subtype": "hook_callback", "callback_id": "cb"}
    });
    match parse_message(data).unwrap() {
        Message::ControlRequest(request) => {
            assert_eq!(request.request, ControlRequestBody::Unsupported);
        }
        other => panic!("Wrong message type: {other:?}"),
    }
}

#[test]
fn test_parse_message_from_value() {
    let init = json!({"type": "system", "subtype": "init", "session_id": "s-9"});
    match parse_message(init).unwrap() {
        Message::System(system) => assert_eq!(system.session_id.unwrap().as_str(), "s-9"),
        other => panic!("Wrong message type: {other:?}"),
    }

    let unknown = parse_message(json!({"type": "rate_limit", "retry_after": 3})).unwrap();
    assert_eq!(unknown.message_type(), "rate_limit");

    // Recognized kind with the wrong shape names the kind
    match parse_message(json!({"type": "assistant", "message": "not an object"})) {
        Err(ClaudeError::MessageParse { message, line }) => {
            assert!(message.contains("assistant"));
            assert!(line.is_none());
        }
        other => panic!("Wrong outcome: {other:?}"),
    }

    assert!(matches!(
        parse_message(json!({"type": 42})),
        Err(ClaudeError::MessageParse { .. })
    ));
}
