//! Bounded external tool invocation.

use std::{ffi::OsStr, process::{Output, Stdio}, time::Duration};

use tokio::{process::Command, time::timeout};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// Run `program` to completion under `limit`.
///
/// The child is killed when the timeout drops the future. A non-zero exit
/// is reported as [`CoreError::ExternalTool`] carrying the first stderr line.
pub async fn run_tool<I, S>(program: &OsStr, args: I, limit: Duration) -> CoreResult<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let label = program.to_string_lossy();

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(
        marker = "EXTERNAL_TOOL",
        operation_type = "spawn",
        command = %label,
        timeout_ms = limit.as_millis(),
        "running external tool"
    );

    let output = match timeout(limit, command.output()).await {
        Ok(result) => result.map_err(|e| CoreError::external_tool(&label, e))?,
        Err(_) => {
            warn!(
                marker = "EXTERNAL_TOOL",
                operation_type = "timeout",
                command = %label,
                "external tool timed out"
            );
            return Err(CoreError::tool_timeout(&label, limit));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr
            .lines()
            .find(|line| !line.trim().is_empty())
            .map_or_else(|| format!("exited with {}", output.status), str::to_string);

        return Err(CoreError::external_tool(&label, reason));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_tool(OsStr::new("glimpse-no-such-tool"), ["--help"], Duration::from_secs(1))
            .await
            .expect_err("missing program");

        assert!(matches!(err, CoreError::ExternalTool { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let err = run_tool(
            OsStr::new("sh"),
            ["-c", "echo 'bad input' >&2; exit 3"],
            Duration::from_secs(5),
        )
        .await
        .expect_err("non-zero exit");

        assert!(err.to_string().contains("bad input"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let err = run_tool(OsStr::new("sleep"), ["5"], Duration::from_millis(50))
            .await
            .expect_err("timeout");

        assert!(matches!(err, CoreError::ToolTimeout { .. }));
    }
}
