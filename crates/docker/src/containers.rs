// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container lifecycle and inspection.

use crate::cli::{command_error, docker, docker_ok, stderr_contains};
use crate::error::DockerError;
use crate::{Docker, LABEL};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

/// Metadata returned by `docker container inspect`.
///
/// The raw JSON document is retained because it gets embedded (redacted)
/// into each job's on-disk metadata; the typed accessors cover the few
/// fields the runner itself consults.
#[derive(Debug, Clone)]
pub struct ContainerMetadata {
    pub raw: serde_json::Value,
}

impl ContainerMetadata {
    pub fn exit_code(&self) -> i64 {
        self.raw["State"]["ExitCode"].as_i64().unwrap_or(-1)
    }

    pub fn is_running(&self) -> bool {
        self.raw["State"]["Running"].as_bool().unwrap_or(false)
    }

    /// The image id (`sha256:…`) the container was created from.
    pub fn image_id(&self) -> Option<&str> {
        self.raw["Image"].as_str()
    }
}

impl Docker {
    /// Start a detached, labelled, named container.
    ///
    /// With `allow_network_access` false the container gets no network at
    /// all.
    pub async fn run(
        &self,
        name: &str,
        args: &[String],
        volume: (&str, &str),
        env: &BTreeMap<String, String>,
        allow_network_access: bool,
    ) -> Result<(), DockerError> {
        let mut run_args: Vec<String> =
            ["run", "--init", "--detach", "--label", LABEL, "--name", name]
                .iter()
                .map(|s| s.to_string())
                .collect();
        if !allow_network_access {
            run_args.push("--network".to_string());
            run_args.push("none".to_string());
        }
        run_args.push("--volume".to_string());
        run_args.push(format!("{}:{}", volume.0, volume.1));
        for (key, value) in env {
            run_args.push("--env".to_string());
            run_args.push(format!("{key}={value}"));
        }
        run_args.extend(args.iter().cloned());

        let arg_refs: Vec<&str> = run_args.iter().map(String::as_str).collect();
        docker_ok(&arg_refs).await?;
        Ok(())
    }

    /// Retrieve metadata about the named container, or `None` if it does not
    /// exist.
    pub async fn container_inspect(
        &self,
        name: &str,
    ) -> Result<Option<ContainerMetadata>, DockerError> {
        let args = ["container", "inspect", "--format", "{{json .}}", name];
        let output = docker(&args).await?;
        if !output.status.success() {
            if stderr_contains(&output, &["No such container", "No such object"]) {
                return Ok(None);
            }
            return Err(command_error(&args, &output));
        }
        let raw: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        Ok(Some(ContainerMetadata { raw }))
    }

    pub async fn container_exists(&self, name: &str) -> Result<bool, DockerError> {
        Ok(self.container_inspect(name).await?.is_some())
    }

    pub async fn container_is_running(&self, name: &str) -> Result<bool, DockerError> {
        Ok(self.container_inspect(name).await?.map(|meta| meta.is_running()).unwrap_or(false))
    }

    /// Force-remove the named container; already-removed is fine.
    pub async fn delete_container(&self, name: &str) -> Result<(), DockerError> {
        let args = ["container", "rm", "--force", name];
        let output = docker(&args).await?;
        if !output.status.success() && !stderr_contains(&output, &["No such container"]) {
            return Err(command_error(&args, &output));
        }
        Ok(())
    }

    /// Dump the container's timestamped logs (stdout and stderr interleaved)
    /// to a file, creating parent directories as needed.
    pub async fn write_logs_to_file(&self, name: &str, path: &Path) -> Result<(), DockerError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = std::fs::File::create(path)?;
        let stderr_file = file.try_clone()?;

        let mut cmd = tokio::process::Command::new("docker");
        cmd.args(["container", "logs", "--timestamps", name])
            .stdout(Stdio::from(file))
            .stderr(Stdio::from(stderr_file))
            .kill_on_drop(true);
        let status = cmd.status().await?;
        if !status.success() {
            return Err(DockerError::Command {
                command: format!("container logs --timestamps {name}"),
                stderr: String::from("see log file for details"),
            });
        }
        Ok(())
    }
}
