//! Running collaborator CLIs
//!
//! Every adapter shells out the same way: capture output, and on a non-zero
//! exit surface the tool's stderr as the error.

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::debug;

/// Run a command to completion and return its stdout
pub async fn run(cmd: &mut Command, what: &str) -> Result<String> {
    debug!(command = ?cmd.as_std(), "Running {}", what);
    let output = cmd
        .output()
        .await
        .with_context(|| format!("Failed to execute {}", what))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        bail!("{} failed ({}): {}", what, output.status, detail);
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command with inherited stdio, for long-running tools whose
/// progress the operator should see
pub async fn run_streaming(cmd: &mut Command, what: &str) -> Result<()> {
    debug!(command = ?cmd.as_std(), "Running {}", what);
    let status = cmd
        .status()
        .await
        .with_context(|| format!("Failed to execute {}", what))?;
    if !status.success() {
        bail!("{} failed ({})", what, status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = run(Command::new("sh").args(["-c", "echo hello"]), "echo").await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_failure_surfaces_stderr() {
        let err = run(
            Command::new("sh").args(["-c", "echo boom >&2; exit 3"]),
            "failing tool",
        )
        .await
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("failing tool failed"));
        assert!(msg.contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let err = run(&mut Command::new("spire-definitely-not-installed"), "ghost")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to execute ghost"));
    }
}
