//! Subprocess transport for the Claude CLI
//!
//! Spawns one CLI process per turn and talks to it over stdin/stdout
//! using newline-delimited JSON.

mod command;
pub mod config;
mod lifecycle;
mod reader;
mod resolver;
mod transport;

pub use command::CommandBuilder;
pub use lifecycle::{ExitCallback, ProcessControl};
pub use reader::{LineEvent, LineReader, StderrTail, is_alert_line};
pub use resolver::{check_availability, resolve_cli, resolve_cli_in};
pub use transport::TurnProcess;
