//! Session state and cumulative statistics

use std::fmt;

use serde::{Deserialize, Serialize};

use super::messages::ResultMessage;

/// Lifecycle state of an agent session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, never started
    #[default]
    NotStarted,
    /// `start()` in progress
    Initializing,
    /// Ready for the next user message
    Idle,
    /// A turn is in flight
    Working,
    /// A turn is paused on a permission request
    WaitingForPermission,
    /// Stopped by the caller; restartable
    Exited,
    /// Turn failed; restartable
    Error,
}

impl SessionState {
    /// Whether a turn (and therefore a child process) is in flight
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Working | Self::WaitingForPermission)
    }

    /// Whether `start()` is legal from this state
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::NotStarted | Self::Exited | Self::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Initializing => "initializing",
            Self::Idle => "idle",
            Self::Working => "working",
            Self::WaitingForPermission => "waiting for permission",
            Self::Exited => "exited",
            Self::Error => "in error",
        };
        f.write_str(name)
    }
}

/// Running totals folded from every turn's `result` message
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Total cost in USD
    pub total_cost_usd: f64,
    /// Total wall-clock duration in milliseconds
    pub total_duration_ms: u64,
    /// Total agent turns reported by the CLI
    pub total_turns: u64,
    /// Completed request/response cycles
    pub results: u64,
    /// Uncached input tokens
    pub input_tokens: u64,
    /// Output tokens
    pub output_tokens: u64,
    /// Input tokens written to the prompt cache
    pub cache_creation_input_tokens: u64,
    /// Input tokens read from the prompt cache
    pub cache_read_input_tokens: u64,
}

impl SessionStats {
    /// Add one turn's result into the running totals
    pub fn fold(&mut self, result: &ResultMessage) {
        self.total_cost_usd += result.total_cost_usd.unwrap_or(0.0);
        self.total_duration_ms += result.duration_ms;
        self.total_turns += u64::from(result.num_turns);
        self.results += 1;
        if let Some(usage) = result.usage {
            self.input_tokens += usage.input_tokens;
            self.output_tokens += usage.output_tokens;
            self.cache_creation_input_tokens += usage.cache_creation_input_tokens;
            self.cache_read_input_tokens += usage.cache_read_input_tokens;
        }
    }
}
