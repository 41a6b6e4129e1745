//! CLI command building logic for subprocess transport

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::session::turn::TurnPlan;
use crate::types::options::SessionOptions;

use super::config::NESTED_SESSION_ENV_VARS;

/// Command builder for one turn of the Claude CLI
pub struct CommandBuilder<'a> {
    plan: &'a TurnPlan,
    options: &'a SessionOptions,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    #[must_use]
    pub const fn new(plan: &'a TurnPlan, options: &'a SessionOptions) -> Self {
        Self { plan, options }
    }

    /// Full argument vector for the turn
    #[must_use]
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        // Structured streaming in both directions, permission prompts over stdio
        for arg in [
            "--print",
            "--output-format",
            "stream-json",
            "--input-format",
            "stream-json",
            "--verbose",
            "--include-partial-messages",
            "--permission-prompt-tool",
            "stdio",
        ] {
            args.push(arg.into());
        }

        self.add_configuration_args(&mut args);
        self.add_session_args(&mut args);

        args
    }

    /// Build the complete CLI command with arguments, environment, and stdio
    #[must_use]
    pub fn build(&self, cli_path: &Path) -> Command {
        let mut cmd = Command::new(cli_path);
        cmd.args(self.args());

        for key in NESTED_SESSION_ENV_VARS {
            cmd.env_remove(key);
        }
        for (key, value) in &self.options.env {
            if NESTED_SESSION_ENV_VARS.contains(&key.as_str()) {
                log::warn!("Ignoring nested-session variable {key} in session env");
                continue;
            }
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.options.cwd {
            cmd.current_dir(cwd);
        }

        // Pipe stderr so the child never touches the parent terminal
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so the whole tree can be killed at once
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    /// Add configuration arguments (model, prompt, tools, directories)
    fn add_configuration_args(&self, args: &mut Vec<OsString>) {
        if let Some(ref model) = self.options.model {
            args.push("--model".into());
            args.push(model.into());
        }

        if let Some(ref append) = self.options.append_system_prompt {
            args.push("--append-system-prompt".into());
            args.push(append.into());
        }

        if !self.options.allowed_tools.is_empty() {
            let tools: Vec<&str> = self
                .options
                .allowed_tools
                .iter()
                .map(|t| t.as_str())
                .collect();
            args.push("--allowedTools".into());
            args.push(tools.join(",").into());
        }

        if !self.options.disallowed_tools.is_empty() {
            let tools: Vec<&str> = self
                .options
                .disallowed_tools
                .iter()
                .map(|t| t.as_str())
                .collect();
            args.push("--disallowedTools".into());
            args.push(tools.join(",").into());
        }

        for dir in &self.options.add_dirs {
            args.push("--add-dir".into());
            args.push(dir.into());
        }
    }

    /// Add session-related arguments (resume, permission bypass)
    fn add_session_args(&self, args: &mut Vec<OsString>) {
        if let Some(ref session_id) = self.plan.resume {
            args.push("--resume".into());
            args.push(session_id.as_str().into());
        }

        if self.plan.dangerous {
            args.push("--dangerously-skip-permissions".into());
        }
    }
}
