//! External command helper
//!
//! Used by the command-driven sources and by the fpcalc/yt-dlp collaborators.

use crate::error::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Run `program args...` and capture stdout
///
/// - `Ok(Some(stdout))` on exit status 0
/// - `Ok(None)` when the program ran but exited non-zero (e.g. "no players found")
/// - `Err` when it could not be started or exceeded `limit`; the child is killed
pub async fn run_command(program: &str, args: &[String], limit: Duration) -> Result<Option<String>> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Process(format!("failed to start {}: {}", program, e)))?;

    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| Error::Process(format!("{} failed: {}", program, e)))?,
        Err(_) => return Err(Error::Timeout(format!("{} after {:?}", program, limit))),
    };

    if !output.status.success() {
        debug!(
            program,
            code = ?output.status.code(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Command exited unsuccessfully"
        );
        return Ok(None);
    }

    Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
}

/// Split a configured command line into program and arguments
pub fn split_command(command: &[String]) -> Result<(&str, &[String])> {
    command
        .split_first()
        .map(|(program, args)| (program.as_str(), args))
        .ok_or_else(|| Error::Process("command is empty".to_string()))
}
