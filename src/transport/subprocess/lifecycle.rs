//! Lifecycle management for turn processes (exit watching, shutdown, kill)

use std::time::Duration;

use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::config::STDOUT_DRAIN_TIMEOUT;

/// Callback invoked once with the exit code after stdout has drained
pub type ExitCallback = Box<dyn FnOnce(Option<i32>) + Send + 'static>;

/// Handle over a supervised turn process
///
/// The child itself is owned by a background exit watcher; this handle can
/// only ask for it to be killed and observe its exit.
#[derive(Debug)]
pub struct ProcessControl {
    pid: Option<u32>,
    kill: CancellationToken,
    exit_rx: watch::Receiver<Option<Option<i32>>>,
}

impl ProcessControl {
    /// Move `child` into an exit watcher task
    ///
    /// When the process exits (on its own or after [`request_kill`]) the
    /// watcher waits up to [`STDOUT_DRAIN_TIMEOUT`] for `stdout_drained` so
    /// that every line the process wrote is dispatched before `on_exit` runs.
    ///
    /// [`request_kill`]: Self::request_kill
    pub fn supervise(
        mut child: Child,
        stdout_drained: CancellationToken,
        on_exit: ExitCallback,
    ) -> Self {
        let pid = child.id();
        let kill = CancellationToken::new();
        let (exit_tx, exit_rx) = watch::channel(None);

        let kill_signal = kill.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                () = kill_signal.cancelled() => {
                    terminate_tree(pid, &mut child);
                    child.wait().await
                }
            };

            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    log::warn!("Failed to reap process {pid:?}: {e}");
                    None
                }
            };

            if tokio::time::timeout(STDOUT_DRAIN_TIMEOUT, stdout_drained.cancelled())
                .await
                .is_err()
            {
                log::warn!("Stdout of process {pid:?} still open after exit");
            }

            on_exit(code);
            exit_tx.send_replace(Some(code));
        });

        Self {
            pid,
            kill,
            exit_rx,
        }
    }

    /// OS process ID
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the exit has been observed
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// Ask the watcher to kill the process tree (non-blocking, idempotent)
    pub fn request_kill(&self) {
        self.kill.cancel();
    }

    /// Wait until the exit has been observed; returns the exit code
    pub async fn wait_exit(&mut self) -> Option<i32> {
        match self.exit_rx.wait_for(Option::is_some).await {
            Ok(code) => code.flatten(),
            // Watcher gone without reporting: the runtime is shutting down
            Err(_) => None,
        }
    }

    /// Wait `grace` for a natural exit, then kill and reap
    ///
    /// The caller closes stdin first; this never blocks longer than
    /// `grace` plus the kill-and-reap time.
    pub async fn shutdown(mut self, grace: Duration) -> Option<i32> {
        if let Ok(code) = tokio::time::timeout(grace, self.wait_exit()).await {
            return code;
        }

        log::info!(
            "Process {:?} did not exit within {}ms, killing",
            self.pid,
            grace.as_millis()
        );
        self.request_kill();
        self.wait_exit().await
    }
}

/// Kill the process and everything in its process group
fn terminate_tree(pid: Option<u32>, child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            log::debug!("killpg({pid}) failed: {e}");
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.start_kill() {
        log::debug!("start_kill failed: {e}");
    }
}
