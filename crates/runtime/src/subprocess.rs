// SPDX-License-Identifier: MIT

//! Subprocess execution helpers, ported from the session/TAP adapter pattern:
//! wrap `Command::output()` with a timeout and log stderr either way.

use std::time::Duration;

use tokio::process::Command;
use tracing::{error, warn};
use zd_core::{Error, Result};

/// Default timeout for host networking helper invocations (`ip`, `brctl`, `ifconfig`).
pub const NET_HELPER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for container CLI stop/kill invocations.
pub const CONTAINER_CLI_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a subprocess command with a timeout, logging stderr on both success
/// (as a non-fatal warning) and failure.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<std::process::Output> {
    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(io_err)) => {
            error!(description, error = %io_err, "subprocess failed to launch");
            return Err(Error::RuntimeError(format!("{description} failed: {io_err}")));
        }
        Err(_elapsed) => {
            error!(description, timeout_s = timeout.as_secs(), "subprocess timed out");
            return Err(Error::RuntimeError(format!(
                "{description} timed out after {}s",
                timeout.as_secs()
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(description, status = %output.status, stderr = %stderr, "subprocess exited non-zero");
        return Err(Error::RuntimeError(format!(
            "{description} exited with {}: {}",
            output.status, stderr
        )));
    }

    if !output.stderr.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(description, stderr = %stderr, "subprocess stderr (non-fatal)");
    }

    Ok(output)
}
