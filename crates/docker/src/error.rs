// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors from the docker CLI layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockerError {
    #[error("i/o failure running docker: {0}")]
    Io(#[from] std::io::Error),
    #[error("docker {command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
    #[error("docker {command} failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("invalid glob pattern '{0}'")]
    BadPattern(String),
    #[error("could not parse docker inspect output: {0}")]
    BadInspect(#[from] serde_json::Error),
    #[error("docker pull failed: {0}")]
    Pull(String),
}
