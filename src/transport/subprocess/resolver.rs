//! CLI binary resolution and availability probing

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::config::SCRIPT_WRAPPER_EXTENSIONS;

/// Resolve the configured CLI against the process `PATH`
///
/// See [`resolve_cli_in`].
#[must_use]
pub fn resolve_cli(configured: &Path) -> PathBuf {
    resolve_cli_in(configured, env::var_os("PATH").as_deref())
}

/// Resolve the configured CLI against an explicit `PATH` value
///
/// An absolute path that exists is returned verbatim. Otherwise each `PATH`
/// directory is searched for the bare name, then the platform executable
/// suffix, then script wrapper extensions; the first hit wins. When nothing
/// matches, the configured value is returned unchanged so the OS gets the
/// final say at spawn time.
#[must_use]
pub fn resolve_cli_in(configured: &Path, path_var: Option<&OsStr>) -> PathBuf {
    if configured.is_absolute() && configured.exists() {
        return configured.to_path_buf();
    }

    // Relative paths with a directory component are left to the OS
    if configured.components().count() > 1 {
        return configured.to_path_buf();
    }

    let Some(path_var) = path_var else {
        return configured.to_path_buf();
    };

    let cwd = env::current_dir().unwrap_or_default();
    let candidates = candidate_names(configured.as_os_str());
    for dir in env::split_paths(path_var) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        // Every candidate name in this directory before the next entry
        for name in &candidates {
            if let Ok(found) = which::which_in(name, Some(&dir), &cwd) {
                log::debug!("Resolved {} to {}", configured.display(), found.display());
                return found;
            }
        }
    }

    log::debug!(
        "{} not found on PATH, deferring to the OS",
        configured.display()
    );
    configured.to_path_buf()
}

/// File names tried in each `PATH` directory, in priority order
fn candidate_names(name: &OsStr) -> Vec<OsString> {
    let mut names = vec![name.to_os_string()];

    let has_extension = Path::new(name).extension().is_some();
    let suffixes = std::iter::once(env::consts::EXE_SUFFIX)
        .filter(|s| !s.is_empty())
        .chain(SCRIPT_WRAPPER_EXTENSIONS.iter().copied());

    if !has_extension {
        for suffix in suffixes {
            let mut with_suffix = name.to_os_string();
            with_suffix.push(suffix);
            if !names.contains(&with_suffix) {
                names.push(with_suffix);
            }
        }
    }

    names
}

/// Probe whether the CLI can be invoked at all
///
/// Runs `<cli> --version` with `timeout`. A non-zero exit, a spawn failure,
/// or a timeout all report `false`; this never errors.
pub async fn check_availability(cli: &Path, timeout: Duration) -> bool {
    let mut cmd = Command::new(cli);
    cmd.arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            log::warn!("{} --version failed to start: {e}", cli.display());
            return false;
        }
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => true,
        Ok(Ok(status)) => {
            log::warn!("{} --version exited with {status}", cli.display());
            false
        }
        Ok(Err(e)) => {
            log::warn!("{} --version could not be awaited: {e}", cli.display());
            false
        }
        Err(_) => {
            log::warn!(
                "{} --version timed out after {}ms",
                cli.display(),
                timeout.as_millis()
            );
            let _ = child.start_kill();
            false
        }
    }
}
