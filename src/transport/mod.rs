//! Transport layer for communicating with the Claude CLI
//!
//! Each turn runs the CLI as a short-lived subprocess. This module spawns it,
//! frames its stdout and stderr into lines, and tears it down again.

pub mod subprocess;

pub use subprocess::{
    CommandBuilder, LineEvent, LineReader, ProcessControl, StderrTail, TurnProcess,
    check_availability, is_alert_line, resolve_cli, resolve_cli_in,
};
