//! Session options and configuration
//!
//! This module contains the configuration object every
//! [`AgentSession`](crate::AgentSession) is constructed with, including a
//! builder pattern for easy configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::identifiers::ToolName;
use crate::transport::subprocess::config::{
    DEFAULT_CLI_NAME, DEFAULT_INACTIVITY_TIMEOUT, DEFAULT_MAX_LINE_BYTES, DEFAULT_SHUTDOWN_GRACE,
    DEFAULT_VERSION_CHECK_TIMEOUT,
};

// ============================================================================
// Session Options
// ============================================================================

/// Main options for an agent session
///
/// Durations serialize as whole milliseconds so a settings store can save and
/// load this value as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Configured CLI binary: absolute path or bare name resolved via `PATH`
    pub cli_path: PathBuf,
    /// Working directory for the CLI process
    pub cwd: Option<PathBuf>,
    /// AI model to request
    pub model: Option<String>,
    /// Text appended to the CLI's default system prompt
    pub append_system_prompt: Option<String>,
    /// Tools the agent may use without asking
    pub allowed_tools: Vec<ToolName>,
    /// Tools the agent may not use
    pub disallowed_tools: Vec<ToolName>,
    /// Additional directories to add to the context
    pub add_dirs: Vec<PathBuf>,
    /// Extra environment variables for the CLI process
    pub env: HashMap<String, String>,
    /// Inactivity window while working; zero disables the watchdog
    #[serde(with = "duration_ms")]
    pub inactivity_timeout: Duration,
    /// How long `stop()` waits for a natural exit before killing
    #[serde(with = "duration_ms")]
    pub shutdown_grace: Duration,
    /// Timeout for the `--version` availability probe
    #[serde(with = "duration_ms")]
    pub version_check_timeout: Duration,
    /// Maximum accepted stdout line length in bytes
    pub max_line_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cli_path: PathBuf::from(DEFAULT_CLI_NAME),
            cwd: None,
            model: None,
            append_system_prompt: None,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            add_dirs: Vec::new(),
            env: HashMap::new(),
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            version_check_timeout: DEFAULT_VERSION_CHECK_TIMEOUT,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl SessionOptions {
    /// Create a new builder for `SessionOptions`
    #[must_use]
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::default()
    }

    /// Inactivity window, `None` when the watchdog is disabled
    #[must_use]
    pub fn inactivity_window(&self) -> Option<Duration> {
        (!self.inactivity_timeout.is_zero()).then_some(self.inactivity_timeout)
    }
}

// ============================================================================
// Builder for SessionOptions
// ============================================================================

/// Builder for `SessionOptions`
#[derive(Debug, Default)]
pub struct SessionOptionsBuilder {
    options: SessionOptions,
}

impl SessionOptionsBuilder {
    /// Set the CLI binary (absolute path or bare name)
    #[must_use]
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cli_path = path.into();
        self
    }

    /// Set working directory
    #[must_use]
    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(path.into());
        self
    }

    /// Set model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Append text to the default system prompt
    #[must_use]
    pub fn append_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.append_system_prompt = Some(prompt.into());
        self
    }

    /// Add an allowed tool
    #[must_use]
    pub fn add_allowed_tool(mut self, tool: impl Into<ToolName>) -> Self {
        self.options.allowed_tools.push(tool.into());
        self
    }

    /// Add a disallowed tool
    #[must_use]
    pub fn add_disallowed_tool(mut self, tool: impl Into<ToolName>) -> Self {
        self.options.disallowed_tools.push(tool.into());
        self
    }

    /// Add a context directory
    #[must_use]
    pub fn add_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.add_dirs.push(dir.into());
        self
    }

    /// Set an extra environment variable for the CLI process
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    /// Set the inactivity window (zero disables the watchdog)
    #[must_use]
    pub const fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.options.inactivity_timeout = timeout;
        self
    }

    /// Set the graceful shutdown window
    #[must_use]
    pub const fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.options.shutdown_grace = grace;
        self
    }

    /// Set the `--version` probe timeout
    #[must_use]
    pub const fn version_check_timeout(mut self, timeout: Duration) -> Self {
        self.options.version_check_timeout = timeout;
        self
    }

    /// Set the maximum stdout line length
    ///
    /// Zero is rejected by [`AgentSession::new`](crate::AgentSession::new).
    #[must_use]
    pub const fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.options.max_line_bytes = bytes;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> SessionOptions {
        self.options
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as milliseconds
    ///
    /// # Errors
    /// Propagates serializer errors
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize from milliseconds
    ///
    /// # Errors
    /// Fails when the value is not an unsigned integer
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
