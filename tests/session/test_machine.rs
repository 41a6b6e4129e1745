//! Unit tests for the session state machine
//!
//! Drives `SessionMachine` directly with decoded protocol lines; no process
//! is involved.

use std::path::Path;
use std::time::Duration;

use kodegen_claude_session::{
    ClaudeError, DiagnosticLevel, Message, Outbox, SessionEvent, SessionMachine, SessionOptions,
    SessionState, TurnId, WatchdogCommand, parse_line,
};
use serde_json::{Value, json};

fn msg(value: Value) -> Message {
    parse_line(&value.to_string()).unwrap().unwrap()
}

fn init(session_id: &str) -> Message {
    msg(json!({
        "type": "system",
        "subtype": "init",
        "session_id": session_id,
        "model": "claude-sonnet-4-5",
        "permissionMode": "default"
    }))
}

fn text_delta(text: &str) -> Message {
    msg(json!({
        "type": "stream_event",
        "event": {"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}}
    }))
}

fn thinking_delta(thinking: &str) -> Message {
    msg(json!({
        "type": "stream_event",
        "event": {"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": thinking}}
    }))
}

fn assistant_text(text: &str) -> Message {
    msg(json!({
        "type": "assistant",
        "message": {"content": [{"type": "text", "text": text}]}
    }))
}

fn result(session_id: &str) -> Message {
    msg(json!({
        "type": "result",
        "subtype": "success",
        "is_error": false,
        "duration_ms": 1000,
        "num_turns": 1,
        "session_id": session_id,
        "total_cost_usd": 0.5,
        "usage": {
            "input_tokens": 1,
            "output_tokens": 2,
            "cache_creation_input_tokens": 3,
            "cache_read_input_tokens": 4
        }
    }))
}

fn can_use_tool(request_id: &str, tool: &str) -> Message {
    msg(json!({
        "type": "control_request",
        "request_id": request_id,
        "request": {
            "subtype": "can_use_tool",
            "tool_name": tool,
            "input": {"command": "ls"},
            "tool_use_id": "toolu_1"
        }
    }))
}

fn assert_invariant(machine: &SessionMachine) {
    assert_eq!(
        machine.state() == SessionState::WaitingForPermission,
        machine.pending_permission().is_some(),
        "WaitingForPermission must coincide with a pending request"
    );
    assert_eq!(
        machine.state().is_in_flight(),
        machine.active_turn().is_some(),
        "a turn is in flight exactly while Working or WaitingForPermission"
    );
}

fn transitions(out: &Outbox) -> Vec<(SessionState, SessionState)> {
    out.events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

fn has_error_diagnostic(out: &Outbox) -> bool {
    out.events.iter().any(|e| {
        matches!(
            e,
            SessionEvent::Diagnostic {
                level: DiagnosticLevel::Error,
                ..
            }
        )
    })
}

fn has_process_exit(out: &Outbox, code: Option<i32>) -> bool {
    out.events
        .iter()
        .any(|e| matches!(e, SessionEvent::ProcessExited { code: c } if *c == code))
}

/// Start the machine and open one turn; returns the turn
fn working(machine: &mut SessionMachine) -> TurnId {
    if machine.state().can_start() {
        machine.start(false).unwrap();
    }
    let plan = machine.prepare_turn().unwrap();
    let out = machine.turn_started(plan.turn, "hi").unwrap();
    assert_eq!(out.writes.len(), 1);
    assert_eq!(out.watchdog, Some(WatchdogCommand::Start));
    plan.turn
}

#[test]
fn test_start_goes_through_initializing_to_idle() {
    let mut machine = SessionMachine::new();
    assert_eq!(machine.state(), SessionState::NotStarted);

    let out = machine.start(true).unwrap();
    assert_eq!(
        transitions(&out),
        vec![
            (SessionState::NotStarted, SessionState::Initializing),
            (SessionState::Initializing, SessionState::Idle),
        ]
    );
    assert!(out.events.iter().any(|e| matches!(
        e,
        SessionEvent::Initialized {
            dangerous: true,
            ..
        }
    )));
    assert!(machine.is_dangerous());
    assert_invariant(&machine);
}

#[test]
fn test_start_twice_is_rejected() {
    let mut machine = SessionMachine::new();
    machine.start(false).unwrap();
    let err = machine.start(false).unwrap_err();
    assert!(matches!(
        err,
        ClaudeError::InvalidState {
            state: SessionState::Idle,
            ..
        }
    ));
    assert!(err.is_misuse());
}

#[test]
fn test_send_requires_idle() {
    let mut machine = SessionMachine::new();
    assert!(matches!(
        machine.prepare_turn(),
        Err(ClaudeError::InvalidState {
            state: SessionState::NotStarted,
            ..
        })
    ));

    working(&mut machine);
    assert!(matches!(
        machine.prepare_turn(),
        Err(ClaudeError::InvalidState {
            state: SessionState::Working,
            ..
        })
    ));
    assert_invariant(&machine);
}

#[test]
fn test_second_send_while_launching_is_rejected() {
    let mut machine = SessionMachine::new();
    machine.start(false).unwrap();
    let plan = machine.prepare_turn().unwrap();

    assert!(machine.prepare_turn().is_err());
    assert_eq!(machine.launching_turn(), Some(plan.turn));
    assert_eq!(machine.state(), SessionState::Idle);
}

#[test]
fn test_result_returns_to_idle_and_clears_turn() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);

    let out = machine.dispatch(turn, result("abc123"));
    assert_eq!(machine.state(), SessionState::Idle);
    assert!(machine.active_turn().is_none());
    assert!(out.close_input);
    assert!(!out.kill);
    assert_eq!(out.watchdog, Some(WatchdogCommand::Stop));
    assert!(
        out.events
            .iter()
            .any(|e| matches!(e, SessionEvent::TurnCompleted(_)))
    );

    let stats = machine.stats();
    assert_eq!(stats.results, 1);
    assert_eq!(stats.input_tokens, 1);
    assert_eq!(stats.cache_read_input_tokens, 4);
    assert!((stats.total_cost_usd - 0.5).abs() < f64::EPSILON);
    assert_invariant(&machine);

    // The later exit of that process does not disturb Idle
    let out = machine.process_exited(turn, Some(1), None);
    assert_eq!(machine.state(), SessionState::Idle);
    assert!(!has_error_diagnostic(&out));
    assert!(out.events.iter().any(|e| matches!(
        e,
        SessionEvent::Diagnostic {
            level: DiagnosticLevel::Warning,
            ..
        }
    )));
}

#[test]
fn test_stats_accumulate_across_turns() {
    let mut machine = SessionMachine::new();
    for _ in 0..3 {
        let turn = working(&mut machine);
        machine.dispatch(turn, result("abc123"));
    }
    let stats = machine.stats();
    assert_eq!(stats.results, 3);
    assert_eq!(stats.output_tokens, 6);
    assert_eq!(stats.total_duration_ms, 3000);
}

#[test]
fn test_init_id_is_resumed_on_next_turn() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);
    assert!(machine.next_turn_plan().resume.is_none());

    let out = machine.dispatch(turn, init("abc123"));
    assert_eq!(machine.state(), SessionState::Working);
    assert!(transitions(&out).is_empty());
    assert!(out.events.iter().any(|e| matches!(
        e,
        SessionEvent::SessionInitialized { session_id: Some(id), .. } if id.as_str() == "abc123"
    )));
    assert_eq!(machine.model(), Some("claude-sonnet-4-5"));
    assert_eq!(machine.permission_mode(), Some("default"));

    machine.dispatch(turn, result("abc123"));

    let plan = machine.prepare_turn().unwrap();
    assert!(plan.resumes("abc123"));

    let args: Vec<String> = plan
        .args(&SessionOptions::default())
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    let pos = args.iter().position(|a| a == "--resume").unwrap();
    assert_eq!(args[pos + 1], "abc123");
}

#[test]
fn test_dangerous_flag_reaches_arguments() {
    let mut machine = SessionMachine::new();
    machine.start(true).unwrap();
    let args = machine.next_turn_plan().args(&SessionOptions::default());
    assert!(args.iter().any(|a| a == "--dangerously-skip-permissions"));

    let mut safe = SessionMachine::new();
    safe.start(false).unwrap();
    let args = safe.next_turn_plan().args(&SessionOptions::default());
    assert!(!args.iter().any(|a| a == "--dangerously-skip-permissions"));
}

#[test]
fn test_streamed_text_is_not_duplicated() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);

    machine.dispatch(turn, text_delta("Hel"));
    machine.dispatch(turn, text_delta("lo"));
    assert_eq!(machine.streamed_text(), "Hello");

    let out = machine.dispatch(turn, assistant_text("Hello"));
    assert_eq!(machine.streamed_text(), "Hello");
    assert!(out.events.iter().any(|e| matches!(
        e,
        SessionEvent::AssistantMessage { text, .. } if text == "Hello"
    )));

    // A new message starts a fresh buffer
    machine.dispatch(turn, text_delta("Next"));
    assert_eq!(machine.streamed_text(), "Next");
}

#[test]
fn test_thinking_and_text_use_separate_buffers() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);

    machine.dispatch(turn, thinking_delta("Consider "));
    machine.dispatch(turn, text_delta("Answer"));
    machine.dispatch(turn, thinking_delta("options"));

    assert_eq!(machine.streamed_thinking(), "Consider options");
    assert_eq!(machine.streamed_text(), "Answer");
}

#[test]
fn test_block_stop_reports_opening_kind() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);

    machine.dispatch(
        turn,
        msg(json!({
            "type": "stream_event",
            "event": {"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}
        })),
    );
    let out = machine.dispatch(
        turn,
        msg(json!({"type": "stream_event", "event": {"type": "content_block_stop", "index": 0}})),
    );
    assert!(out.events.iter().any(|e| matches!(
        e,
        SessionEvent::ContentBlockStopped {
            index: 0,
            kind: Some(kodegen_claude_session::BlockKind::Thinking)
        }
    )));
}

#[test]
fn test_deny_returns_to_working() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);

    let out = machine.dispatch(turn, can_use_tool("req-1", "Bash"));
    assert_eq!(machine.state(), SessionState::WaitingForPermission);
    assert_eq!(out.watchdog, Some(WatchdogCommand::Stop));
    assert_eq!(
        machine.pending_permission().unwrap().tool_name.as_str(),
        "Bash"
    );
    assert_invariant(&machine);

    let out = machine.deny(Some("not allowed")).unwrap();
    assert_eq!(machine.state(), SessionState::Working);
    assert!(machine.pending_permission().is_none());
    assert_eq!(out.watchdog, Some(WatchdogCommand::Start));
    assert_eq!(out.writes.len(), 1);

    let response: Value = serde_json::from_str(out.writes[0].trim_end()).unwrap();
    assert_eq!(response["type"], "control_response");
    assert_eq!(response["response"]["request_id"], "req-1");
    assert_eq!(response["response"]["response"]["behavior"], "deny");
    assert_eq!(response["response"]["response"]["message"], "not allowed");
    assert_invariant(&machine);
}

#[test]
fn test_deny_without_reason_uses_default() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);
    machine.dispatch(turn, can_use_tool("req-1", "Write"));

    let out = machine.deny(None).unwrap();
    let response: Value = serde_json::from_str(out.writes[0].trim_end()).unwrap();
    assert_eq!(
        response["response"]["response"]["message"],
        "The user denied this tool use."
    );
}

#[test]
fn test_allow_and_answer_echo_input() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);

    machine.dispatch(turn, can_use_tool("req-1", "Bash"));
    let out = machine.allow().unwrap();
    let response: Value = serde_json::from_str(out.writes[0].trim_end()).unwrap();
    assert_eq!(response["response"]["response"]["behavior"], "allow");
    assert_eq!(
        response["response"]["response"]["updatedInput"],
        json!({"command": "ls"})
    );
    assert_eq!(response["response"]["response"]["toolUseID"], "toolu_1");

    machine.dispatch(turn, can_use_tool("req-2", "AskUserQuestion"));
    let out = machine.answer_question("Proceed?", "yes").unwrap();
    let response: Value = serde_json::from_str(out.writes[0].trim_end()).unwrap();
    assert_eq!(
        response["response"]["response"]["updatedInput"],
        json!({"command": "ls", "answers": {"Proceed?": "yes"}})
    );
    assert_eq!(machine.state(), SessionState::Working);
}

#[test]
fn test_resolving_without_pending_fails() {
    let mut machine = SessionMachine::new();
    assert!(matches!(machine.allow(), Err(ClaudeError::NoPendingPermission)));

    working(&mut machine);
    assert!(matches!(
        machine.deny(None),
        Err(ClaudeError::NoPendingPermission)
    ));
    assert!(matches!(
        machine.answer_question("q", "a"),
        Err(ClaudeError::NoPendingPermission)
    ));
    assert!(matches!(
        machine.allow_with_input(json!({})),
        Err(ClaudeError::NoPendingPermission)
    ));
    assert_eq!(machine.state(), SessionState::Working);
}

#[test]
fn test_overlapping_permission_request_is_ignored() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);

    machine.dispatch(turn, can_use_tool("req-1", "Bash"));
    let out = machine.dispatch(turn, can_use_tool("req-2", "Write"));
    assert_eq!(
        machine.pending_permission().unwrap().request_id.as_str(),
        "req-1"
    );
    assert!(transitions(&out).is_empty());
}

#[test]
fn test_unknown_type_changes_nothing() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);
    machine.dispatch(turn, can_use_tool("req-1", "Bash"));

    let out = machine.dispatch(turn, msg(json!({"type": "rate_limit_event", "x": 1})));
    assert_eq!(machine.state(), SessionState::WaitingForPermission);
    assert!(machine.pending_permission().is_some());
    assert!(out.events.is_empty());
    assert!(out.writes.is_empty());
}

#[test]
fn test_parse_failure_is_a_warning_only() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);

    let err = parse_line("{oops").unwrap_err();
    let out = machine.parse_failed(turn, &err);
    assert_eq!(machine.state(), SessionState::Working);
    assert_eq!(out.watchdog, Some(WatchdogCommand::Reset));
    assert!(!has_error_diagnostic(&out));
    assert_eq!(out.events.len(), 1);
}

#[test]
fn test_unsupported_control_request_gets_error_reply() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);

    let out = machine.dispatch(
        turn,
        msg(json!({
            "type": "control_request",
            "request_id": "req-5",
            "request": {"subtype": "mcp_message", "server_name": "x"}
        })),
    );
    assert_eq!(machine.state(), SessionState::Working);
    let reply: Value = serde_json::from_str(out.writes[0].trim_end()).unwrap();
    assert_eq!(reply["response"]["subtype"], "error");
    assert_eq!(reply["response"]["request_id"], "req-5");
}

#[test]
fn test_exit_without_result_is_an_error() {
    for code in [Some(0), Some(1), None] {
        let mut machine = SessionMachine::new();
        let turn = working(&mut machine);

        let out = machine.process_exited(turn, code, Some("boom".to_string()));
        assert_eq!(machine.state(), SessionState::Error, "exit code {code:?}");
        assert!(has_error_diagnostic(&out));
        assert!(has_process_exit(&out, code));
        assert!(machine.last_error().unwrap().contains("boom"));
        assert_invariant(&machine);
    }
}

#[test]
fn test_exit_while_waiting_for_permission_is_an_error() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);
    machine.dispatch(turn, can_use_tool("req-1", "Bash"));

    machine.process_exited(turn, Some(2), None);
    assert_eq!(machine.state(), SessionState::Error);
    assert!(machine.pending_permission().is_none());
    assert_invariant(&machine);
}

#[test]
fn test_output_closed_mid_turn_kills_and_errors() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);

    let out = machine.output_closed(turn, None, None);
    assert_eq!(machine.state(), SessionState::Error);
    assert!(out.kill);
    assert!(has_error_diagnostic(&out));

    // Late exit of the killed process is harmless
    machine.process_exited(turn, None, None);
    assert_eq!(machine.state(), SessionState::Error);
}

#[test]
fn test_output_read_error_is_reported_as_io() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);

    let read_error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe went away");
    let out = machine.output_closed(turn, Some(read_error), Some("segfault".to_string()));

    assert!(out.kill);
    assert_eq!(machine.state(), SessionState::Error);
    let cause = machine.last_error().unwrap();
    assert!(cause.starts_with("IO error: pipe went away"), "{cause}");
    assert!(cause.contains("segfault"));
}

#[test]
fn test_output_closed_after_result_is_normal() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);
    machine.dispatch(turn, result("abc"));

    let out = machine.output_closed(turn, None, None);
    assert!(out.is_empty());
    assert_eq!(machine.state(), SessionState::Idle);
}

#[test]
fn test_error_is_restartable() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);
    machine.dispatch(turn, init("abc123"));
    machine.process_exited(turn, Some(1), None);
    assert_eq!(machine.state(), SessionState::Error);

    machine.start(false).unwrap();
    assert_eq!(machine.state(), SessionState::Idle);
    assert!(machine.last_error().is_none());
    assert!(machine.next_turn_plan().resumes("abc123"));
}

#[test]
fn test_launch_failure_goes_to_error() {
    let mut machine = SessionMachine::new();
    machine.start(false).unwrap();
    let plan = machine.prepare_turn().unwrap();

    let out = machine.turn_failed(plan.turn, &ClaudeError::cli_not_found(Path::new("claude")));
    assert_eq!(
        transitions(&out),
        vec![(SessionState::Idle, SessionState::Error)]
    );
    assert_eq!(out.watchdog, Some(WatchdogCommand::Stop));
    assert!(machine.active_turn().is_none());
    assert!(machine.launching_turn().is_none());
    assert_invariant(&machine);
}

#[test]
fn test_stale_turn_input_is_ignored() {
    let mut machine = SessionMachine::new();
    let first = working(&mut machine);
    machine.dispatch(first, result("abc"));
    let second = working(&mut machine);

    let out = machine.dispatch(first, text_delta("late"));
    assert!(out.is_empty());
    assert_eq!(machine.streamed_text(), "");

    machine.dispatch(second, text_delta("fresh"));
    assert_eq!(machine.streamed_text(), "fresh");
}

#[test]
fn test_stop_abandons_turn() {
    let mut machine = SessionMachine::new();
    let turn = working(&mut machine);
    machine.dispatch(turn, can_use_tool("req-1", "Bash"));

    let out = machine.stop();
    assert_eq!(machine.state(), SessionState::Exited);
    assert!(machine.pending_permission().is_none());
    assert_eq!(out.watchdog, Some(WatchdogCommand::Stop));
    assert_invariant(&machine);

    assert!(machine.stop().is_empty());
    assert!(SessionMachine::new().stop().is_empty());
}

#[test]
fn test_stop_during_launch_invalidates_turn() {
    let mut machine = SessionMachine::new();
    machine.start(false).unwrap();
    let plan = machine.prepare_turn().unwrap();

    machine.stop();
    assert!(machine.turn_started(plan.turn, "hi").is_err());
    assert_eq!(machine.state(), SessionState::Exited);
}

#[test]
fn test_inactivity_only_while_working() {
    let mut machine = SessionMachine::new();
    let idle = Duration::from_secs(90);
    assert!(machine.inactivity_elapsed(idle).is_empty());

    let turn = working(&mut machine);
    let out = machine.inactivity_elapsed(idle);
    assert!(
        out.events
            .iter()
            .any(|e| matches!(e, SessionEvent::InactivityTimeout { .. }))
    );
    assert_eq!(machine.state(), SessionState::Working);

    machine.dispatch(turn, can_use_tool("req-1", "Bash"));
    assert!(machine.inactivity_elapsed(idle).is_empty());
}
