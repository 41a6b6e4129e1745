//! Configuration constants for subprocess transport

use std::time::Duration;

/// CLI binary looked up on `PATH` when nothing else is configured
pub const DEFAULT_CLI_NAME: &str = "claude";

/// Default maximum stdout line length (1MB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Default inactivity window while a turn is working
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(90);

/// Default wait for a natural exit before the process tree is killed
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default timeout for the `--version` availability probe
pub const DEFAULT_VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the exit watcher waits for stdout to drain after the process exits
pub const STDOUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Number of stderr lines kept for diagnostics
pub const STDERR_TAIL_LINES: usize = 50;

/// Environment variables that make the CLI believe it runs inside another
/// Claude Code session
///
/// They are stripped from the child's environment and can not be re-added
/// through `SessionOptions::env`.
pub const NESTED_SESSION_ENV_VARS: &[&str] = &["CLAUDECODE", "CLAUDE_CODE_ENTRYPOINT"];

/// Script wrapper extensions tried after the native executable name
#[cfg(windows)]
pub const SCRIPT_WRAPPER_EXTENSIONS: &[&str] = &[".cmd", ".bat"];

/// Script wrapper extensions tried after the native executable name
#[cfg(not(windows))]
pub const SCRIPT_WRAPPER_EXTENSIONS: &[&str] = &[".sh"];

/// Stderr fragments (lowercase) that escalate a line to a caller-visible diagnostic
pub const STDERR_ALERT_MARKERS: &[&str] = &[
    "error", "warn", "fatal", "panic", "exception", "failed", "denied",
];
