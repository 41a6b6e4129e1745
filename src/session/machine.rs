//! Session state machine
//!
//! [`SessionMachine`] owns every piece of mutable session state and performs
//! no I/O. Each entry point validates the call against the current state,
//! mutates, and returns an [`Outbox`] describing what the caller has to do:
//! events to publish, lines to write to the turn's stdin, whether to close
//! stdin or kill the process, and what to do with the watchdog.
//!
//! Process-side inputs ([`dispatch`], [`process_exited`], ...) are tagged
//! with the [`TurnId`] they came from. Inputs from a turn that is no longer
//! in flight are ignored, which makes late lines and late exits harmless.
//!
//! [`dispatch`]: SessionMachine::dispatch
//! [`process_exited`]: SessionMachine::process_exited

use std::io;
use std::time::Duration;

use chrono::Utc;

use crate::control::protocol::{self, OutgoingMessage};
use crate::error::{ClaudeError, Result};
use crate::types::events::{DiagnosticLevel, SessionEvent, TurnSummary};
use crate::types::identifiers::SessionId;
use crate::types::messages::{
    AssistantMessage, ControlRequestBody, ControlRequestMessage, Delta, Message, ResultMessage,
    StreamEvent, SystemMessage,
};
use crate::types::permissions::{DEFAULT_DENY_MESSAGE, PendingPermission};
use crate::types::state::{SessionState, SessionStats};

use super::stream::StreamBuffers;
use super::turn::{TurnId, TurnPlan};

/// What to do with the inactivity watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogCommand {
    /// Arm a fresh countdown
    Start,
    /// Push the running countdown forward
    Reset,
    /// Disarm
    Stop,
}

/// Side effects requested by a state machine step
#[derive(Debug, Default)]
pub struct Outbox {
    /// Notifications, in order
    pub events: Vec<SessionEvent>,
    /// Encoded lines for the in-flight turn's stdin, in order
    pub writes: Vec<String>,
    /// Close the turn's stdin so the process can exit
    pub close_input: bool,
    /// Kill the turn's process
    pub kill: bool,
    /// Watchdog action; later steps override earlier ones
    pub watchdog: Option<WatchdogCommand>,
}

impl Outbox {
    fn event(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    fn diagnostic(&mut self, level: DiagnosticLevel, message: impl Into<String>) {
        self.events.push(SessionEvent::diagnostic(level, message));
    }

    /// Whether the step requested nothing at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.writes.is_empty()
            && !self.close_input
            && !self.kill
            && self.watchdog.is_none()
    }
}

/// Sans-IO session controller
#[derive(Debug, Default)]
pub struct SessionMachine {
    state: SessionState,
    dangerous: bool,
    pending: Option<PendingPermission>,
    session_id: Option<SessionId>,
    model: Option<String>,
    permission_mode: Option<String>,
    stats: SessionStats,
    last_error: Option<String>,
    stream: StreamBuffers,
    next_turn: u64,
    launching: Option<TurnId>,
    active_turn: Option<TurnId>,
}

impl SessionMachine {
    /// Fresh machine in `NotStarted`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether permission prompts are skipped
    #[must_use]
    pub const fn is_dangerous(&self) -> bool {
        self.dangerous
    }

    /// Permission request awaiting a decision
    #[must_use]
    pub const fn pending_permission(&self) -> Option<&PendingPermission> {
        self.pending.as_ref()
    }

    /// Remote session ID reported by the agent
    #[must_use]
    pub const fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Model reported by the agent
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Permission mode reported by the agent
    #[must_use]
    pub fn permission_mode(&self) -> Option<&str> {
        self.permission_mode.as_deref()
    }

    /// Cumulative statistics
    #[must_use]
    pub const fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Cause of the most recent failure
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Text streamed for the current assistant message
    #[must_use]
    pub fn streamed_text(&self) -> &str {
        self.stream.text()
    }

    /// Reasoning streamed for the current assistant message
    #[must_use]
    pub fn streamed_thinking(&self) -> &str {
        self.stream.thinking()
    }

    /// Turn whose process is in flight
    #[must_use]
    pub const fn active_turn(&self) -> Option<TurnId> {
        self.active_turn
    }

    /// Turn reserved by [`prepare_turn`](Self::prepare_turn) and not yet started
    #[must_use]
    pub const fn launching_turn(&self) -> Option<TurnId> {
        self.launching
    }

    /// Plan the next turn would be launched with
    #[must_use]
    pub fn next_turn_plan(&self) -> TurnPlan {
        TurnPlan {
            turn: TurnId(self.next_turn + 1),
            resume: self.session_id.clone(),
            dangerous: self.dangerous,
        }
    }

    // ------------------------------------------------------------------
    // Caller operations
    // ------------------------------------------------------------------

    /// Arm the session
    ///
    /// # Errors
    /// `InvalidState` unless the session is `NotStarted`, `Exited` or `Error`
    pub fn start(&mut self, dangerous: bool) -> Result<Outbox> {
        if !self.state.can_start() {
            return Err(ClaudeError::invalid_state("start", self.state));
        }

        let mut out = Outbox::default();
        self.dangerous = dangerous;
        self.pending = None;
        self.launching = None;
        self.active_turn = None;
        self.last_error = None;
        self.stream.reset();

        self.transition(SessionState::Initializing, &mut out);
        out.event(SessionEvent::Initialized {
            dangerous,
            session_id: self.session_id.clone(),
        });
        self.transition(SessionState::Idle, &mut out);
        Ok(out)
    }

    /// Reserve the next turn and describe how to launch it
    ///
    /// The state stays `Idle` until [`turn_started`](Self::turn_started) or
    /// [`turn_failed`](Self::turn_failed), but further calls are rejected.
    ///
    /// # Errors
    /// `InvalidState` unless the session is `Idle` with no launch pending
    pub fn prepare_turn(&mut self) -> Result<TurnPlan> {
        if self.state != SessionState::Idle {
            return Err(ClaudeError::invalid_state("send a message", self.state));
        }
        if self.launching.is_some() {
            return Err(ClaudeError::invalid_state(
                "send a message",
                SessionState::Working,
            ));
        }

        let plan = self.next_turn_plan();
        self.next_turn = plan.turn.0;
        self.launching = Some(plan.turn);
        Ok(plan)
    }

    /// The process for `turn` is running; open the turn with `text`
    ///
    /// # Errors
    /// `InvalidState` if `turn` is no longer the reserved launch (e.g. the
    /// session was stopped meanwhile); the caller must discard the process
    pub fn turn_started(&mut self, turn: TurnId, text: &str) -> Result<Outbox> {
        if self.launching != Some(turn) || self.state != SessionState::Idle {
            return Err(ClaudeError::invalid_state("send a message", self.state));
        }

        let line = protocol::encode(&protocol::user_message(text))?;

        let mut out = Outbox::default();
        self.launching = None;
        self.active_turn = Some(turn);
        self.stream.reset();
        self.transition(SessionState::Working, &mut out);
        out.writes.push(line);
        out.watchdog = Some(WatchdogCommand::Start);
        Ok(out)
    }

    /// Launching `turn` failed before a process existed
    pub fn turn_failed(&mut self, turn: TurnId, cause: &ClaudeError) -> Outbox {
        let mut out = Outbox::default();
        if self.launching != Some(turn) {
            log::debug!("Ignoring launch failure of stale turn {turn}: {cause}");
            return out;
        }

        self.launching = None;
        self.fail(cause.to_string(), &mut out);
        out
    }

    /// Allow the pending tool use with its original input
    ///
    /// # Errors
    /// `NoPendingPermission` unless waiting for permission
    pub fn allow(&mut self) -> Result<Outbox> {
        self.resolve(|pending| protocol::allow(pending, pending.input.clone()))
    }

    /// Allow the pending tool use with caller-edited input
    ///
    /// # Errors
    /// `NoPendingPermission` unless waiting for permission
    pub fn allow_with_input(&mut self, input: serde_json::Value) -> Result<Outbox> {
        self.resolve(move |pending| protocol::allow(pending, input))
    }

    /// Allow the pending tool use with `answer` merged in for `question`
    ///
    /// # Errors
    /// `NoPendingPermission` unless waiting for permission
    pub fn answer_question(&mut self, question: &str, answer: &str) -> Result<Outbox> {
        self.resolve(|pending| protocol::allow(pending, pending.input_with_answer(question, answer)))
    }

    /// Deny the pending tool use
    ///
    /// # Errors
    /// `NoPendingPermission` unless waiting for permission
    pub fn deny(&mut self, reason: Option<&str>) -> Result<Outbox> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_DENY_MESSAGE);
        self.resolve(|pending| protocol::deny(pending, reason))
    }

    /// Stop the session; any in-flight turn is abandoned
    ///
    /// A no-op from `NotStarted` and `Exited`. The caller tears the process
    /// down itself.
    pub fn stop(&mut self) -> Outbox {
        let mut out = Outbox::default();
        if matches!(self.state, SessionState::NotStarted | SessionState::Exited) {
            return out;
        }

        self.pending = None;
        self.launching = None;
        self.active_turn = None;
        out.watchdog = Some(WatchdogCommand::Stop);
        self.transition(SessionState::Exited, &mut out);
        out
    }

    // ------------------------------------------------------------------
    // Process-side inputs
    // ------------------------------------------------------------------

    /// Dispatch a decoded stdout line from `turn`
    pub fn dispatch(&mut self, turn: TurnId, message: Message) -> Outbox {
        let mut out = Outbox::default();
        if !self.is_live(turn) {
            log::debug!(
                "Ignoring {} line from stale turn {turn}",
                message.message_type()
            );
            return out;
        }

        self.note_activity(&mut out);

        match message {
            Message::System(system) => self.on_system(system, &mut out),
            Message::Assistant(assistant) => self.on_assistant(assistant, &mut out),
            Message::StreamEvent(stream) => self.on_stream_event(stream.event, &mut out),
            Message::Result(result) => self.on_result(result, &mut out),
            Message::ControlRequest(request) => self.on_control_request(request, &mut out),
            Message::Unknown { message_type } => {
                log::debug!("Ignoring message of unknown type {message_type:?}");
            }
        }
        out
    }

    /// A stdout line from `turn` could not be decoded
    pub fn parse_failed(&mut self, turn: TurnId, cause: &ClaudeError) -> Outbox {
        let mut out = Outbox::default();
        if !self.is_live(turn) {
            return out;
        }

        self.note_activity(&mut out);
        log::warn!("Skipping undecodable line: {cause}");
        out.diagnostic(DiagnosticLevel::Warning, cause.to_string());
        out
    }

    /// Stdout of `turn` ended, cleanly (`read_error == None`) or not
    pub fn output_closed(
        &mut self,
        turn: TurnId,
        read_error: Option<io::Error>,
        stderr: Option<String>,
    ) -> Outbox {
        let mut out = Outbox::default();
        if !self.is_live(turn) {
            return out;
        }

        let cause = match read_error {
            Some(e) => ClaudeError::Io(e),
            None => ClaudeError::stream_ended("agent output closed before a result was received"),
        };
        out.kill = true;
        self.fail(with_stderr(cause.to_string(), stderr), &mut out);
        out
    }

    /// The process of `turn` exited
    pub fn process_exited(
        &mut self,
        turn: TurnId,
        code: Option<i32>,
        stderr: Option<String>,
    ) -> Outbox {
        let mut out = Outbox::default();
        out.event(SessionEvent::ProcessExited { code });

        if self.is_live(turn) {
            let cause = ClaudeError::process(
                "agent exited before sending a result",
                code,
                stderr.clone(),
            );
            self.fail(with_stderr(cause.to_string(), stderr), &mut out);
            return out;
        }

        // The turn already completed (or was abandoned); exit status is advisory
        if let Some(code) = code
            && code != 0
            && matches!(self.state, SessionState::Idle | SessionState::Working)
        {
            log::warn!("Turn {turn} process exited with code {code} after its result");
            out.diagnostic(
                DiagnosticLevel::Warning,
                format!("Agent process exited with code {code} after completing the turn"),
            );
        }
        out
    }

    /// The watchdog elapsed
    pub fn inactivity_elapsed(&mut self, idle: Duration) -> Outbox {
        let mut out = Outbox::default();
        if self.state != SessionState::Working {
            return out;
        }

        log::warn!("No agent output for {}ms", idle.as_millis());
        out.event(SessionEvent::InactivityTimeout { idle });
        out
    }

    // ------------------------------------------------------------------
    // Message handlers
    // ------------------------------------------------------------------

    fn on_system(&mut self, system: SystemMessage, out: &mut Outbox) {
        if !system.is_init() {
            log::debug!("Ignoring system message {:?}", system.subtype);
            return;
        }

        if let Some(ref id) = system.session_id {
            self.session_id = Some(id.clone());
        }
        if let Some(ref model) = system.model {
            self.model = Some(model.clone());
        }
        if let Some(ref mode) = system.permission_mode {
            self.permission_mode = Some(mode.clone());
        }

        log::info!(
            "Agent session {:?} initialized (model {:?})",
            system.session_id.as_ref().map(SessionId::as_str),
            system.model
        );
        out.event(SessionEvent::SessionInitialized {
            session_id: system.session_id,
            model: system.model,
            permission_mode: system.permission_mode,
        });
    }

    fn on_assistant(&mut self, assistant: AssistantMessage, out: &mut Outbox) {
        // Sub-agent output does not belong in the main transcript buffers
        if assistant.parent_tool_use_id.is_none() {
            self.stream.supersede(&assistant);
        }
        if self.model.is_none() {
            self.model.clone_from(&assistant.message.model);
        }

        out.event(SessionEvent::AssistantMessage {
            text: assistant.text(),
            thinking: assistant.thinking(),
            tool_uses: assistant.tool_uses(),
        });
    }

    fn on_stream_event(&mut self, event: StreamEvent, out: &mut Outbox) {
        match event {
            StreamEvent::MessageStart => self.stream.message_started(),
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let kind = content_block.kind();
                self.stream.block_started(index, kind.clone());
                out.event(SessionEvent::ContentBlockStarted {
                    index,
                    kind,
                    block: content_block,
                });
            }
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                Delta::TextDelta { text } => {
                    self.stream.push_text(&text);
                    out.event(SessionEvent::TextDelta { text });
                }
                Delta::ThinkingDelta { thinking } => {
                    self.stream.push_thinking(&thinking);
                    out.event(SessionEvent::ThinkingDelta { thinking });
                }
                Delta::Other => {}
            },
            StreamEvent::ContentBlockStop { index } => {
                let kind = self.stream.block_stopped(index);
                out.event(SessionEvent::ContentBlockStopped { index, kind });
            }
            StreamEvent::Other => {}
        }
    }

    fn on_result(&mut self, result: ResultMessage, out: &mut Outbox) {
        self.stats.fold(&result);
        if let Some(ref id) = result.session_id {
            self.session_id = Some(id.clone());
        }

        let level = if result.is_error {
            DiagnosticLevel::Error
        } else {
            DiagnosticLevel::Warning
        };
        for error in &result.errors {
            out.diagnostic(level, error.clone());
        }
        if result.is_error {
            let cause = if result.errors.is_empty() {
                result
                    .result
                    .clone()
                    .unwrap_or_else(|| format!("Turn ended with {}", result.subtype))
            } else {
                result.errors.join("\n")
            };
            self.last_error = Some(cause);
        }

        log::info!(
            "Turn {:?} completed: {} (cost ${:.4})",
            self.active_turn.map(|t| t.0),
            result.subtype,
            result.total_cost_usd.unwrap_or(0.0)
        );

        self.pending = None;
        self.active_turn = None;
        out.close_input = true;
        out.watchdog = Some(WatchdogCommand::Stop);
        self.transition(SessionState::Idle, out);
        out.event(SessionEvent::TurnCompleted(Box::new(TurnSummary {
            result,
            stats: self.stats,
            completed_at: Utc::now(),
        })));
    }

    fn on_control_request(&mut self, request: ControlRequestMessage, out: &mut Outbox) {
        match request.request {
            ControlRequestBody::CanUseTool {
                tool_name,
                input,
                tool_use_id,
            } => {
                if let Some(ref pending) = self.pending {
                    log::warn!(
                        "Protocol violation: permission request {} for {tool_name} while {} is pending",
                        request.request_id,
                        pending.request_id
                    );
                    out.diagnostic(
                        DiagnosticLevel::Warning,
                        format!("Ignored overlapping permission request for {tool_name}"),
                    );
                    return;
                }

                let pending = PendingPermission {
                    request_id: request.request_id,
                    tool_name,
                    tool_use_id,
                    input,
                };
                log::debug!("Permission requested for {}", pending.tool_name);
                self.pending = Some(pending.clone());
                out.watchdog = Some(WatchdogCommand::Stop);
                self.transition(SessionState::WaitingForPermission, out);
                out.event(SessionEvent::PermissionRequested(pending));
            }
            ControlRequestBody::Unsupported => {
                log::warn!(
                    "Rejecting unsupported control request {}",
                    request.request_id
                );
                let reply = protocol::unsupported(
                    request.request_id,
                    "Unsupported control request subtype",
                );
                queue(&reply, out);
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn is_live(&self, turn: TurnId) -> bool {
        self.active_turn == Some(turn) && self.state.is_in_flight()
    }

    fn note_activity(&self, out: &mut Outbox) {
        if self.state == SessionState::Working {
            out.watchdog = Some(WatchdogCommand::Reset);
        }
    }

    fn resolve(
        &mut self,
        respond: impl FnOnce(&PendingPermission) -> OutgoingMessage,
    ) -> Result<Outbox> {
        let pending = match self.pending {
            Some(ref pending) if self.state == SessionState::WaitingForPermission => pending,
            _ => return Err(ClaudeError::NoPendingPermission),
        };

        let line = protocol::encode(&respond(pending))?;

        let mut out = Outbox::default();
        self.pending = None;
        out.writes.push(line);
        out.watchdog = Some(WatchdogCommand::Start);
        self.transition(SessionState::Working, &mut out);
        Ok(out)
    }

    fn fail(&mut self, cause: String, out: &mut Outbox) {
        log::error!("Turn failed: {cause}");
        self.pending = None;
        self.active_turn = None;
        out.watchdog = Some(WatchdogCommand::Stop);
        out.diagnostic(DiagnosticLevel::Error, cause.clone());
        self.last_error = Some(cause);
        self.transition(SessionState::Error, out);
    }

    fn transition(&mut self, to: SessionState, out: &mut Outbox) {
        let from = self.state;
        if from == to {
            return;
        }
        log::debug!("State {from} -> {to}");
        self.state = to;
        out.event(SessionEvent::StateChanged { from, to });
    }
}

fn queue(message: &OutgoingMessage, out: &mut Outbox) {
    match protocol::encode(message) {
        Ok(line) => out.writes.push(line),
        Err(e) => log::error!("Failed to encode outgoing message: {e}"),
    }
}

fn with_stderr(message: String, stderr: Option<String>) -> String {
    match stderr {
        Some(tail) => format!("{message}\nstderr:\n{tail}"),
        None => message,
    }
}
