// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The capability contract the job runner needs from a container runtime.
//!
//! [`Docker`] is the production implementation; tests substitute an
//! in-memory fake.

use crate::containers::ContainerMetadata;
use crate::error::DockerError;
use crate::Docker;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a volume (and whatever scaffolding is needed for later copy
    /// and glob operations). Idempotent.
    async fn create_volume(&self, volume_name: &str) -> Result<(), DockerError>;

    /// Delete a volume and its scaffolding. Idempotent.
    async fn delete_volume(&self, volume_name: &str) -> Result<(), DockerError>;

    async fn copy_to_volume(
        &self,
        volume_name: &str,
        source: &Path,
        dest: &str,
    ) -> Result<(), DockerError>;

    async fn copy_from_volume(
        &self,
        volume_name: &str,
        source: &str,
        dest: &Path,
    ) -> Result<(), DockerError>;

    /// Match shell globs (`*` does not cross `/`) against the files in a
    /// volume, in one round trip. Returns pattern → sorted relative paths.
    async fn glob_volume_files(
        &self,
        volume_name: &str,
        patterns: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>, DockerError>;

    /// Start a detached, named compute container.
    async fn run(
        &self,
        name: &str,
        args: &[String],
        volume: (&str, &str),
        env: &BTreeMap<String, String>,
        allow_network_access: bool,
    ) -> Result<(), DockerError>;

    /// Metadata for a container, or `None` if it does not exist.
    async fn container_inspect(&self, name: &str)
        -> Result<Option<ContainerMetadata>, DockerError>;

    async fn container_exists(&self, name: &str) -> Result<bool, DockerError> {
        Ok(self.container_inspect(name).await?.is_some())
    }

    async fn container_is_running(&self, name: &str) -> Result<bool, DockerError> {
        Ok(self.container_inspect(name).await?.map(|meta| meta.is_running()).unwrap_or(false))
    }

    /// Force-remove a container. Idempotent.
    async fn delete_container(&self, name: &str) -> Result<(), DockerError>;

    /// Dump the container's timestamped logs to a file, creating parents.
    async fn write_logs_to_file(&self, name: &str, path: &Path) -> Result<(), DockerError>;

    async fn image_exists_locally(&self, image: &str) -> Result<bool, DockerError>;

    async fn pull(&self, image: &str) -> Result<(), DockerError>;
}

#[async_trait]
impl ContainerRuntime for Docker {
    async fn create_volume(&self, volume_name: &str) -> Result<(), DockerError> {
        Docker::create_volume(self, volume_name).await
    }

    async fn delete_volume(&self, volume_name: &str) -> Result<(), DockerError> {
        Docker::delete_volume(self, volume_name).await
    }

    async fn copy_to_volume(
        &self,
        volume_name: &str,
        source: &Path,
        dest: &str,
    ) -> Result<(), DockerError> {
        Docker::copy_to_volume(self, volume_name, source, dest).await
    }

    async fn copy_from_volume(
        &self,
        volume_name: &str,
        source: &str,
        dest: &Path,
    ) -> Result<(), DockerError> {
        Docker::copy_from_volume(self, volume_name, source, dest).await
    }

    async fn glob_volume_files(
        &self,
        volume_name: &str,
        patterns: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>, DockerError> {
        Docker::glob_volume_files(self, volume_name, patterns).await
    }

    async fn run(
        &self,
        name: &str,
        args: &[String],
        volume: (&str, &str),
        env: &BTreeMap<String, String>,
        allow_network_access: bool,
    ) -> Result<(), DockerError> {
        Docker::run(self, name, args, volume, env, allow_network_access).await
    }

    async fn container_inspect(
        &self,
        name: &str,
    ) -> Result<Option<ContainerMetadata>, DockerError> {
        Docker::container_inspect(self, name).await
    }

    async fn delete_container(&self, name: &str) -> Result<(), DockerError> {
        Docker::delete_container(self, name).await
    }

    async fn write_logs_to_file(&self, name: &str, path: &Path) -> Result<(), DockerError> {
        Docker::write_logs_to_file(self, name, path).await
    }

    async fn image_exists_locally(&self, image: &str) -> Result<bool, DockerError> {
        Docker::image_exists_locally(self, image).await
    }

    async fn pull(&self, image: &str) -> Result<(), DockerError> {
        Docker::pull(self, image).await
    }
}
