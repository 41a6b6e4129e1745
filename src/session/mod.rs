//! `AgentSession`: event-driven controller for the Claude CLI
//!
//! A session runs one CLI process per turn and exposes what happens as a
//! stream of [`SessionEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        AgentSession                         │
//! │                                                             │
//! │  caller ──► start / send / allow / deny / stop              │
//! │                  │                                          │
//! │                  ▼                                          │
//! │     Mutex<SessionCore> ──► SessionMachine (sans-IO)         │
//! │        ▲    │                   │                           │
//! │        │    │                   └──► Outbox                 │
//! │        │    ▼                         ├─ events ──► channel │
//! │        │  TurnHandle                  ├─ stdin lines        │
//! │        │    ├─ stdin writer task      └─ watchdog command   │
//! │        ├────┼─ stdout reader task                           │
//! │        ├────┼─ stderr reader task                           │
//! │        └────┴─ exit watcher task                            │
//! │        ▲                                                    │
//! │        └──── Watchdog task                                  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation goes through the one lock. Events are queued on an
//! unbounded channel while the lock is held, so their order always matches
//! the order of the transitions that produced them; a dispatcher callback
//! runs on its own task and may call back into the session.
//!
//! # Example
//!
//! ```no_run
//! use kodegen_claude_session::{AgentSession, SessionEvent, SessionOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = AgentSession::new(SessionOptions::default())?;
//! let mut events = session.take_event_receiver().ok_or("receiver taken")?;
//!
//! session.start(false)?;
//! session.send_message("List the files in this directory").await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::TextDelta { text } => print!("{text}"),
//!         SessionEvent::PermissionRequested(_) => session.allow()?,
//!         SessionEvent::TurnCompleted(_) => break,
//!         _ => {}
//!     }
//! }
//!
//! session.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod machine;
pub mod stream;
mod tasks;
pub mod turn;

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{ClaudeError, Result};
use crate::message::parse_line;
use crate::transport::subprocess::config::STDERR_TAIL_LINES;
use crate::transport::subprocess::{
    StderrTail, TurnProcess, check_availability, is_alert_line, resolve_cli,
};
use crate::types::events::{DiagnosticLevel, EventDispatcher, SessionEvent};
use crate::types::identifiers::SessionId;
use crate::types::options::SessionOptions;
use crate::types::permissions::PendingPermission;
use crate::types::state::{SessionState, SessionStats};
use crate::watchdog::{FireCallback, Watchdog};

use machine::{Outbox, SessionMachine, WatchdogCommand};
use tasks::TurnHandle;
use turn::{TurnId, TurnPlan};

/// Mutable session state, guarded by one lock
struct SessionCore {
    machine: SessionMachine,
    watchdog: Watchdog,
    /// Process of the in-flight turn
    active: Option<TurnHandle>,
    /// Processes whose turn is over but which have not been reaped yet
    retiring: Vec<TurnHandle>,
    stderr: StderrTail,
    /// Turn whose stderr feeds `stderr`
    stderr_turn: Option<TurnId>,
    disposed: bool,
}

pub(crate) struct SessionInner {
    key: Uuid,
    options: SessionOptions,
    events: mpsc::UnboundedSender<SessionEvent>,
    cli_confirmed: AtomicBool,
    core: Mutex<SessionCore>,
}

/// Controller for one conversation with the Claude CLI
///
/// Created without a process. [`start`](Self::start) arms it, each
/// [`send_message`](Self::send_message) runs one turn in a fresh process
/// (resuming the remote session after the first), and the permission methods
/// answer the agent's tool-use prompts.
///
/// Environmental failures never surface as `Err`; they move the session to
/// [`SessionState::Error`] and are reported as events. Only calls that are
/// illegal in the current state return an error.
///
/// Must be created inside a Tokio runtime.
pub struct AgentSession {
    inner: Arc<SessionInner>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl AgentSession {
    /// Create a session whose events are read from
    /// [`take_event_receiver`](Self::take_event_receiver)
    ///
    /// Events queue up until the receiver is taken and drained.
    ///
    /// # Errors
    /// `InvalidConfig` if the options are unusable or no Tokio runtime is
    /// running
    pub fn new(options: SessionOptions) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            ClaudeError::invalid_config("AgentSession must be created inside a Tokio runtime")
        })?;
        if options.max_line_bytes == 0 {
            return Err(ClaudeError::invalid_config(
                "max_line_bytes must be greater than zero",
            ));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let window = options.inactivity_window();

        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<SessionInner>| {
            let weak = weak.clone();
            let on_fire: FireCallback = Arc::new(move |generation| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_inactivity(generation);
                }
            });

            SessionInner {
                key: Uuid::new_v4(),
                options,
                events: events_tx,
                cli_confirmed: AtomicBool::new(false),
                core: Mutex::new(SessionCore {
                    machine: SessionMachine::new(),
                    watchdog: Watchdog::new(window, &runtime, on_fire),
                    active: None,
                    retiring: Vec::new(),
                    stderr: StderrTail::new(STDERR_TAIL_LINES),
                    stderr_turn: None,
                    disposed: false,
                }),
            }
        });

        log::debug!("[{}] Session created", inner.key);

        Ok(Self {
            inner,
            events_rx: Some(events_rx),
        })
    }

    /// Create a session that hands every event to `dispatcher`
    ///
    /// The dispatcher runs on a dedicated task, in event order, outside the
    /// session lock, so it may call back into the session.
    ///
    /// # Errors
    /// Same as [`new`](Self::new)
    pub fn with_dispatcher(options: SessionOptions, dispatcher: EventDispatcher) -> Result<Self> {
        let mut session = Self::new(options)?;
        if let Some(mut events) = session.events_rx.take() {
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    dispatcher(event);
                }
            });
        }
        Ok(session)
    }

    /// Take the event receiver; `None` once taken or with a dispatcher
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.take()
    }

    /// Local key identifying this session in log lines
    #[must_use]
    pub fn key(&self) -> Uuid {
        self.inner.key
    }

    /// Options the session was created with
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Arm the session; no process is spawned yet
    ///
    /// # Errors
    /// `InvalidState` unless `NotStarted`, `Exited` or `Error`;
    /// `SessionDisposed` after [`dispose`](Self::dispose)
    pub fn start(&self, dangerous: bool) -> Result<()> {
        let mut core = self.inner.lock_live()?;
        let out = core.machine.start(dangerous)?;
        log::info!(
            "[{}] Session started{}",
            self.inner.key,
            if dangerous { " (permissions skipped)" } else { "" }
        );
        self.inner.apply(&mut core, out);
        Ok(())
    }

    /// Run one turn with `text` as the user message
    ///
    /// Returns once the process is running and the message is queued; the
    /// reply arrives as events. If the CLI is unavailable or fails to launch,
    /// the session moves to `Error` and this still returns `Ok`.
    ///
    /// # Errors
    /// `InvalidState` unless `Idle`; `SessionDisposed` after
    /// [`dispose`](Self::dispose)
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let plan = {
            let mut core = self.inner.lock_live()?;
            core.machine.prepare_turn()?
        };

        let cli = resolve_cli(&self.inner.options.cli_path);
        let available = self.inner.probe(&cli).await;

        let mut core = self.inner.lock_live()?;
        if core.machine.launching_turn() != Some(plan.turn) {
            log::debug!(
                "[{}] Turn {} abandoned before launch",
                self.inner.key,
                plan.turn
            );
            return Ok(());
        }

        if !available {
            let out = core
                .machine
                .turn_failed(plan.turn, &ClaudeError::cli_not_found(&cli));
            self.inner.apply(&mut core, out);
            return Ok(());
        }

        let process = match TurnProcess::spawn(&cli, &plan, &self.inner.options) {
            Ok(process) => process,
            Err(e) => {
                let out = core.machine.turn_failed(plan.turn, &e);
                self.inner.apply(&mut core, out);
                return Ok(());
            }
        };

        let out = match core.machine.turn_started(plan.turn, text) {
            Ok(out) => out,
            Err(e) => {
                // Process is dropped here and killed by `kill_on_drop`
                let out = core.machine.turn_failed(plan.turn, &e);
                self.inner.apply(&mut core, out);
                return Ok(());
            }
        };

        core.stderr.clear();
        core.stderr_turn = Some(plan.turn);
        core.active = Some(TurnHandle::launch(&self.inner, plan.turn, process));
        log::info!(
            "[{}] Turn {} started{}",
            self.inner.key,
            plan.turn,
            plan.resume
                .as_ref()
                .map(|id| format!(" (resuming {id})"))
                .unwrap_or_default()
        );
        self.inner.apply(&mut core, out);
        Ok(())
    }

    /// Allow the pending tool use with its original input
    ///
    /// # Errors
    /// `NoPendingPermission` unless waiting for permission
    pub fn allow(&self) -> Result<()> {
        self.resolve(SessionMachine::allow)
    }

    /// Allow the pending tool use with edited input
    ///
    /// # Errors
    /// `NoPendingPermission` unless waiting for permission
    pub fn allow_with_input(&self, input: serde_json::Value) -> Result<()> {
        self.resolve(move |machine| machine.allow_with_input(input))
    }

    /// Answer a question the agent asked through a tool
    ///
    /// The answer is merged into the tool input under `answers[question]`
    /// and the tool use is allowed.
    ///
    /// # Errors
    /// `NoPendingPermission` unless waiting for permission
    pub fn answer_question(&self, question: &str, answer: &str) -> Result<()> {
        self.resolve(|machine| machine.answer_question(question, answer))
    }

    /// Deny the pending tool use; `None` sends a default reason
    ///
    /// # Errors
    /// `NoPendingPermission` unless waiting for permission
    pub fn deny(&self, reason: Option<&str>) -> Result<()> {
        self.resolve(|machine| machine.deny(reason))
    }

    fn resolve(&self, decide: impl FnOnce(&mut SessionMachine) -> Result<Outbox>) -> Result<()> {
        let mut core = self.inner.lock_live()?;
        let out = decide(&mut core.machine)?;
        self.inner.apply(&mut core, out);
        Ok(())
    }

    /// Stop the session and wait until every turn process is gone
    ///
    /// Stdin is closed first; a process still alive after
    /// [`SessionOptions::shutdown_grace`] has its process tree killed. A
    /// no-op on a disposed session.
    ///
    /// # Errors
    /// Never fails today; the `Result` keeps the signature aligned with the
    /// other operations
    pub async fn stop(&self) -> Result<()> {
        let handles = {
            let mut core = self.inner.core.lock();
            if core.disposed {
                return Ok(());
            }
            let out = core.machine.stop();
            self.inner.apply(&mut core, out);
            core.take_handles()
        };

        if handles.is_empty() {
            return Ok(());
        }

        log::info!(
            "[{}] Stopping {} turn process(es)",
            self.inner.key,
            handles.len()
        );
        let grace = self.inner.options.shutdown_grace;
        futures::future::join_all(handles.into_iter().map(|h| h.shutdown(grace))).await;
        Ok(())
    }

    /// Release everything: stop reading, kill processes, stop the watchdog
    ///
    /// Idempotent. Afterwards every operation except `stop` fails with
    /// `SessionDisposed`.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.core.lock().machine.state()
    }

    /// Whether permission prompts are skipped
    #[must_use]
    pub fn is_dangerous(&self) -> bool {
        self.inner.core.lock().machine.is_dangerous()
    }

    /// Permission request awaiting a decision
    #[must_use]
    pub fn pending_permission(&self) -> Option<PendingPermission> {
        self.inner.core.lock().machine.pending_permission().cloned()
    }

    /// Remote session ID reported by the agent
    #[must_use]
    pub fn remote_session_id(&self) -> Option<SessionId> {
        self.inner.core.lock().machine.session_id().cloned()
    }

    /// Model reported by the agent
    #[must_use]
    pub fn model(&self) -> Option<String> {
        self.inner.core.lock().machine.model().map(str::to_string)
    }

    /// Cumulative statistics
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.inner.core.lock().machine.stats()
    }

    /// Cause of the most recent failure
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.core.lock().machine.last_error().map(str::to_string)
    }

    /// Text streamed for the current assistant message
    #[must_use]
    pub fn streamed_text(&self) -> String {
        self.inner.core.lock().machine.streamed_text().to_string()
    }

    /// Reasoning streamed for the current assistant message
    #[must_use]
    pub fn streamed_thinking(&self) -> String {
        self.inner.core.lock().machine.streamed_thinking().to_string()
    }

    /// Recent stderr lines of the current or last turn
    #[must_use]
    pub fn recent_stderr(&self) -> Vec<String> {
        self.inner.core.lock().stderr.lines()
    }

    /// Plan the next turn would be launched with
    #[must_use]
    pub fn next_turn_plan(&self) -> TurnPlan {
        self.inner.core.lock().machine.next_turn_plan()
    }

    /// Whether a turn process is currently attached
    #[must_use]
    pub fn has_active_process(&self) -> bool {
        self.inner.core.lock().active.is_some()
    }

    /// Probe whether the configured CLI can be invoked
    ///
    /// Never errors; an unusable binary reports `false`.
    pub async fn check_availability(&self) -> bool {
        let cli = resolve_cli(&self.inner.options.cli_path);
        self.inner.cli_confirmed.store(false, Ordering::Release);
        self.inner.probe(&cli).await
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("key", &self.inner.key)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionCore {
    fn take_handles(&mut self) -> Vec<TurnHandle> {
        let mut handles: Vec<TurnHandle> = self.retiring.drain(..).collect();
        handles.extend(self.active.take());
        handles
    }

    fn remove_handle(&mut self, turn: TurnId) {
        if self.active.as_ref().is_some_and(|h| h.turn == turn) {
            self.active = None;
        }
        self.retiring.retain(|h| h.turn != turn);
    }
}

impl SessionInner {
    fn lock_live(&self) -> Result<parking_lot::MutexGuard<'_, SessionCore>> {
        let core = self.core.lock();
        if core.disposed {
            return Err(ClaudeError::SessionDisposed);
        }
        Ok(core)
    }

    /// `--version` probe, skipped once the binary has answered successfully
    async fn probe(&self, cli: &Path) -> bool {
        if self.cli_confirmed.load(Ordering::Acquire) {
            return true;
        }
        let available = check_availability(cli, self.options.version_check_timeout).await;
        if available {
            self.cli_confirmed.store(true, Ordering::Release);
        } else {
            log::warn!("[{}] {} is not available", self.key, cli.display());
        }
        available
    }

    /// Carry out a machine step
    fn apply(&self, core: &mut SessionCore, out: Outbox) {
        let Outbox {
            events,
            writes,
            close_input,
            kill,
            watchdog,
        } = out;

        if let Some(ref handle) = core.active {
            for line in writes {
                handle.write(line);
            }
        } else if !writes.is_empty() {
            log::warn!(
                "[{}] Dropping {} line(s) with no turn in flight",
                self.key,
                writes.len()
            );
        }

        if (close_input || kill)
            && let Some(handle) = core.active.take()
        {
            if kill {
                handle.abort();
            } else {
                handle.close_input();
            }
            core.retiring.push(handle);
        }

        match watchdog {
            Some(WatchdogCommand::Start) => core.watchdog.start(),
            Some(WatchdogCommand::Reset) => core.watchdog.reset(),
            Some(WatchdogCommand::Stop) => core.watchdog.stop(),
            None => {}
        }

        for event in events {
            // A dropped receiver just means nobody is listening
            let _ = self.events.send(event);
        }
    }

    fn dispose(&self) {
        let handles = {
            let mut core = self.core.lock();
            if core.disposed {
                return;
            }
            core.disposed = true;
            let out = core.machine.stop();
            self.apply(&mut core, out);
            core.watchdog.stop();
            core.take_handles()
        };

        for handle in &handles {
            handle.abort();
        }
        log::debug!(
            "[{}] Session disposed ({} process(es) killed)",
            self.key,
            handles.len()
        );
    }

    // ------------------------------------------------------------------
    // Task callbacks
    // ------------------------------------------------------------------

    fn on_stdout_line(&self, turn: TurnId, line: &str) {
        let parsed = parse_line(line);

        let mut core = self.core.lock();
        let out = match parsed {
            Ok(Some(message)) => core.machine.dispatch(turn, message),
            Ok(None) => return,
            Err(e) => core.machine.parse_failed(turn, &e),
        };
        self.apply(&mut core, out);
    }

    fn on_parse_failure(&self, turn: TurnId, cause: &ClaudeError) {
        let mut core = self.core.lock();
        let out = core.machine.parse_failed(turn, cause);
        self.apply(&mut core, out);
    }

    fn on_stdout_closed(&self, turn: TurnId, read_error: Option<io::Error>) {
        let mut core = self.core.lock();
        let stderr = core.stderr.joined();
        let out = core.machine.output_closed(turn, read_error, stderr);
        self.apply(&mut core, out);
    }

    fn on_stderr_line(&self, turn: TurnId, line: String) {
        log::debug!("[{}] turn {turn} stderr: {line}", self.key);

        let mut core = self.core.lock();
        // A retiring process may still be writing while the next turn runs
        if core.stderr_turn != Some(turn) {
            return;
        }
        if is_alert_line(&line) {
            let _ = self
                .events
                .send(SessionEvent::diagnostic(DiagnosticLevel::Warning, line.clone()));
        }
        core.stderr.push(line);
    }

    fn on_process_exit(&self, turn: TurnId, code: Option<i32>) {
        log::debug!("[{}] Turn {turn} process exited with {code:?}", self.key);

        let mut core = self.core.lock();
        let stderr = core.stderr.joined();
        let out = core.machine.process_exited(turn, code, stderr);
        core.remove_handle(turn);
        self.apply(&mut core, out);
    }

    fn on_inactivity(&self, generation: u64) {
        let mut core = self.core.lock();
        if core.disposed || !core.watchdog.is_current(generation) {
            return;
        }
        let Some(window) = core.watchdog.window() else {
            return;
        };
        let out = core.machine.inactivity_elapsed(window);
        self.apply(&mut core, out);
    }
}
