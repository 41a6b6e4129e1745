//! Inactivity watchdog for in-flight turns
//!
//! One background task per session sleeps until the current deadline. The
//! owner arms it with [`Watchdog::start`], pushes the deadline forward with
//! [`Watchdog::reset`] and disarms it with [`Watchdog::stop`]. Every arm
//! bumps a generation counter that is handed to the fire callback; the owner
//! checks it with [`Watchdog::is_current`] under its own lock, so a fire that
//! raced with a `stop` is recognised as stale and dropped.
//!
//! The watchdog only notifies. It never touches the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Callback invoked with the generation that elapsed
pub type FireCallback = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Deadline {
    generation: u64,
    at: Instant,
}

/// Single-shot, resettable inactivity countdown
pub struct Watchdog {
    window: Option<Duration>,
    generation: u64,
    armed: bool,
    deadline_tx: Option<watch::Sender<Option<Deadline>>>,
    task: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Create a watchdog with the given window
    ///
    /// `None` (or a zero window) disables it: no task is spawned and every
    /// method is a no-op.
    pub fn new(window: Option<Duration>, runtime: &Handle, on_fire: FireCallback) -> Self {
        let window = window.filter(|w| !w.is_zero());

        let (deadline_tx, task) = match window {
            Some(_) => {
                let (tx, rx) = watch::channel(None);
                let task = runtime.spawn(run(rx, on_fire));
                (Some(tx), Some(task))
            }
            None => (None, None),
        };

        Self {
            window,
            generation: 0,
            armed: false,
            deadline_tx,
            task,
        }
    }

    /// Configured window, `None` when disabled
    #[must_use]
    pub const fn window(&self) -> Option<Duration> {
        self.window
    }

    /// Whether a countdown is pending
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed
    }

    /// Arm (or re-arm) a fresh countdown
    pub fn start(&mut self) {
        let Some(window) = self.window else {
            return;
        };
        self.generation += 1;
        self.armed = true;
        self.publish(Some(Deadline {
            generation: self.generation,
            at: Instant::now() + window,
        }));
    }

    /// Restart the countdown if one is pending
    pub fn reset(&mut self) {
        if self.armed {
            self.start();
        }
    }

    /// Disarm; a fire already in flight becomes stale
    pub fn stop(&mut self) {
        if self.window.is_none() {
            return;
        }
        self.generation += 1;
        self.armed = false;
        self.publish(None);
    }

    /// Consume a fire for `generation`
    ///
    /// Returns `true` exactly once for the live countdown and disarms it;
    /// stale generations return `false`.
    pub fn is_current(&mut self, generation: u64) -> bool {
        if self.armed && self.generation == generation {
            self.armed = false;
            true
        } else {
            false
        }
    }

    fn publish(&self, deadline: Option<Deadline>) {
        if let Some(ref tx) = self.deadline_tx {
            tx.send_replace(deadline);
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("window", &self.window)
            .field("generation", &self.generation)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

async fn run(mut rx: watch::Receiver<Option<Deadline>>, on_fire: FireCallback) {
    loop {
        let current = *rx.borrow_and_update();

        if let Some(deadline) = current {
            tokio::select! {
                () = tokio::time::sleep_until(deadline.at) => {
                    on_fire(deadline.generation);
                    // Single-shot: stay quiet until re-armed
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        } else if rx.changed().await.is_err() {
            return;
        }
    }
}
