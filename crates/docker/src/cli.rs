// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared subprocess plumbing for docker invocations.

use crate::error::DockerError;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Generous ceiling: copying large output files through `docker cp` is the
/// slowest thing we do.
pub(crate) const DOCKER_TIMEOUT: Duration = Duration::from_secs(600);

/// Run `docker <args>` and capture its output, without checking the exit
/// status.
pub(crate) async fn docker(args: &[&str]) -> Result<Output, DockerError> {
    let mut cmd = Command::new("docker");
    cmd.args(args).kill_on_drop(true);
    let verb = args.first().copied().unwrap_or("");
    match tokio::time::timeout(DOCKER_TIMEOUT, cmd.output()).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(DockerError::Timeout {
            command: verb.to_string(),
            seconds: DOCKER_TIMEOUT.as_secs(),
        }),
    }
}

/// Run `docker <args>` and fail unless it exits successfully.
pub(crate) async fn docker_ok(args: &[&str]) -> Result<Output, DockerError> {
    let output = docker(args).await?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(command_error(args, &output))
    }
}

pub(crate) fn command_error(args: &[&str], output: &Output) -> DockerError {
    DockerError::Command {
        command: args.join(" "),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Did a failed invocation report one of the given conditions on stderr?
///
/// Used to swallow "already exists" / "no such object" errors where the
/// operation is semantically idempotent.
pub(crate) fn stderr_contains(output: &Output, needles: &[&str]) -> bool {
    let stderr = String::from_utf8_lossy(&output.stderr);
    needles.iter().any(|needle| stderr.contains(needle))
}
