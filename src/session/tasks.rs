//! Background tasks of one turn
//!
//! Every turn gets a stdin writer, a stdout reader, a stderr reader and an
//! exit watcher. The tasks only hold a `Weak` reference to the session, so
//! dropping the session is never delayed by a turn that is still winding
//! down.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ClaudeError;
use crate::transport::subprocess::config::STDOUT_DRAIN_TIMEOUT;
use crate::transport::subprocess::{
    ExitCallback, LineEvent, LineReader, ProcessControl, TurnProcess,
};

use super::SessionInner;
use super::turn::TurnId;

enum InputCommand {
    Line(String),
    Close,
}

/// Owned handles of a running turn process
pub(super) struct TurnHandle {
    pub(super) turn: TurnId,
    input: mpsc::UnboundedSender<InputCommand>,
    readers: CancellationToken,
    process: ProcessControl,
}

impl TurnHandle {
    /// Wire up all tasks for a freshly spawned process
    pub(super) fn launch(inner: &Arc<SessionInner>, turn: TurnId, process: TurnProcess) -> Self {
        let TurnProcess {
            child,
            pid,
            stdin,
            stdout,
            stderr,
        } = process;

        let key = inner.key;
        let max_line = inner.options.max_line_bytes;
        let readers = CancellationToken::new();
        let drained = CancellationToken::new();
        let exited = CancellationToken::new();
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_stdin(stdin, input_rx, key, turn));
        tokio::spawn(read_stdout(
            Arc::downgrade(inner),
            turn,
            stdout,
            max_line,
            readers.clone(),
            drained.clone(),
            exited.clone(),
        ));
        tokio::spawn(read_stderr(
            Arc::downgrade(inner),
            turn,
            stderr,
            max_line,
            readers.clone(),
        ));

        let weak = Arc::downgrade(inner);
        let on_exit: ExitCallback = Box::new(move |code| {
            if let Some(inner) = weak.upgrade() {
                inner.on_process_exit(turn, code);
            }
            exited.cancel();
        });
        let process = ProcessControl::supervise(child, drained, on_exit);

        log::debug!("[{key}] Turn {turn} running as pid {pid:?}");

        Self {
            turn,
            input: input_tx,
            readers,
            process,
        }
    }

    /// Queue a line for the process's stdin
    pub(super) fn write(&self, line: String) {
        if self.input.send(InputCommand::Line(line)).is_err() {
            log::warn!("Turn {} stdin already closed, dropping write", self.turn);
        }
    }

    /// Close stdin once every queued line is written
    pub(super) fn close_input(&self) {
        let _ = self.input.send(InputCommand::Close);
    }

    /// Stop reading and kill the process without waiting
    pub(super) fn abort(&self) {
        self.readers.cancel();
        self.close_input();
        self.process.request_kill();
    }

    /// Stop reading, close stdin, and wait for the process to be gone
    pub(super) async fn shutdown(self, grace: Duration) -> Option<i32> {
        // Readers first so a closing pipe is not mistaken for a failure
        self.readers.cancel();
        self.close_input();
        self.process.shutdown(grace).await
    }
}

async fn write_stdin(
    mut stdin: ChildStdin,
    mut input: mpsc::UnboundedReceiver<InputCommand>,
    key: uuid::Uuid,
    turn: TurnId,
) {
    while let Some(command) = input.recv().await {
        match command {
            InputCommand::Line(line) => {
                let result = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.flush().await
                }
                .await;
                if let Err(e) = result {
                    log::warn!("[{key}] Writing to turn {turn} stdin failed: {e}");
                    break;
                }
            }
            InputCommand::Close => break,
        }
    }

    if let Err(e) = stdin.shutdown().await {
        log::debug!("[{key}] Closing turn {turn} stdin: {e}");
    }
    log::debug!("[{key}] Turn {turn} stdin closed");
}

async fn read_stdout(
    session: Weak<SessionInner>,
    turn: TurnId,
    stdout: ChildStdout,
    max_line: usize,
    cancel: CancellationToken,
    drained: CancellationToken,
    exited: CancellationToken,
) {
    let mut reader = LineReader::new(stdout, max_line);

    let read_error = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                drained.cancel();
                return;
            }
            next = reader.next_line() => next,
        };

        let Some(inner) = session.upgrade() else {
            drained.cancel();
            return;
        };

        match next {
            Ok(Some(LineEvent::Line(line))) => inner.on_stdout_line(turn, &line),
            Ok(Some(LineEvent::Oversized { bytes })) => inner.on_parse_failure(
                turn,
                &ClaudeError::message_parse(
                    format!("Dropped a {bytes} byte line (limit {max_line})"),
                    None,
                ),
            ),
            Ok(None) => break None,
            Err(e) => break Some(e),
        }
    };

    drained.cancel();

    // On a clean EOF give the exit watcher the first word: its exit code is
    // the more useful cause
    if read_error.is_none() {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = exited.cancelled() => {}
            () = tokio::time::sleep(STDOUT_DRAIN_TIMEOUT) => {}
        }
    }

    if let Some(inner) = session.upgrade() {
        inner.on_stdout_closed(turn, read_error);
    }
}

async fn read_stderr(
    session: Weak<SessionInner>,
    turn: TurnId,
    stderr: ChildStderr,
    max_line: usize,
    cancel: CancellationToken,
) {
    let mut reader = LineReader::new(stderr, max_line);

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            next = reader.next_line() => next,
        };

        match next {
            Ok(Some(LineEvent::Line(line))) => {
                if line.trim().is_empty() {
                    continue;
                }
                let Some(inner) = session.upgrade() else {
                    return;
                };
                inner.on_stderr_line(turn, line);
            }
            Ok(Some(LineEvent::Oversized { bytes })) => {
                log::debug!("Turn {turn} stderr: dropped a {bytes} byte line");
            }
            Ok(None) => return,
            Err(e) => {
                log::debug!("Turn {turn} stderr read failed: {e}");
                return;
            }
        }
    }
}
