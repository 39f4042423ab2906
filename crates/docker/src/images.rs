// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Image queries and pulls.

use crate::cli::{command_error, docker, stderr_contains};
use crate::error::DockerError;
use crate::Docker;
use std::process::Stdio;

impl Docker {
    /// Does the image (name and version) exist locally?
    ///
    /// Compute containers never pull implicitly, so the run loop checks this
    /// before starting a job.
    pub async fn image_exists_locally(&self, image: &str) -> Result<bool, DockerError> {
        let args = ["image", "inspect", "--format", "ok", image];
        let output = docker(&args).await?;
        if output.status.success() {
            return Ok(true);
        }
        if stderr_contains(&output, &["No such image", "No such object"]) {
            return Ok(false);
        }
        Err(command_error(&args, &output))
    }

    /// Pull an image, streaming progress to the terminal.
    ///
    /// Only used in local-run mode, where someone is watching.
    pub async fn pull(&self, image: &str) -> Result<(), DockerError> {
        let mut cmd = tokio::process::Command::new("docker");
        cmd.args(["pull", image]).stdout(Stdio::inherit()).stderr(Stdio::piped());
        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(DockerError::Pull(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}
