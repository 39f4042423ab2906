// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volume lifecycle, file transfer, and in-volume glob matching.

use crate::cli::{command_error, docker, docker_ok, stderr_contains};
use crate::error::DockerError;
use crate::{Docker, LABEL, VOLUME_MOUNT_POINT};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the manager sidecar attached to a volume.
pub fn manager_name(volume_name: &str) -> String {
    format!("{volume_name}-manager")
}

impl Docker {
    /// Create the named volume and its manager container.
    ///
    /// A container with the volume mounted must exist before we can copy
    /// files in and out, but it does not need to be running. Idempotent:
    /// re-creating an existing volume/manager pair succeeds.
    pub async fn create_volume(&self, volume_name: &str) -> Result<(), DockerError> {
        docker_ok(&["volume", "create", "--label", LABEL, "--name", volume_name]).await?;

        let manager = manager_name(volume_name);
        let mount = format!("{volume_name}:{VOLUME_MOUNT_POINT}");
        let args = [
            "container",
            "create",
            "--label",
            LABEL,
            "--name",
            &manager,
            "--volume",
            &mount,
            "--entrypoint",
            "sh",
            "--interactive",
            "--init",
            self.management_image(),
        ];
        let output = docker(&args).await?;
        // `docker volume create` is naturally idempotent; the container
        // create is not, so swallow the name clash.
        if !output.status.success() && !stderr_contains(&output, &["is already in use by container"])
        {
            return Err(command_error(&args, &output));
        }
        Ok(())
    }

    /// Delete the named volume and its manager container. Tolerates both
    /// having already been removed.
    pub async fn delete_volume(&self, volume_name: &str) -> Result<(), DockerError> {
        let manager = manager_name(volume_name);
        let args = ["container", "rm", "--force", manager.as_str()];
        let output = docker(&args).await?;
        if !output.status.success() && !stderr_contains(&output, &["No such container"]) {
            return Err(command_error(&args, &output));
        }

        let args = ["volume", "rm", volume_name];
        let output = docker(&args).await?;
        if !output.status.success() && !stderr_contains(&output, &["No such volume", "no such volume"])
        {
            return Err(command_error(&args, &output));
        }
        Ok(())
    }

    /// Copy a host file or directory into the volume at `dest` (relative to
    /// the volume root). Directory sources copy their contents rather than
    /// the directory itself.
    pub async fn copy_to_volume(
        &self,
        volume_name: &str,
        source: &Path,
        dest: &str,
    ) -> Result<(), DockerError> {
        let mut source_arg = source.display().to_string();
        if source.is_dir() {
            source_arg = format!("{}/.", source_arg.trim_end_matches('/'));
        }
        let target = format!("{}:{VOLUME_MOUNT_POINT}/{dest}", manager_name(volume_name));
        docker_ok(&["cp", &source_arg, &target]).await?;
        Ok(())
    }

    /// Copy a file out of the volume to a host path, creating parent
    /// directories as needed.
    pub async fn copy_from_volume(
        &self,
        volume_name: &str,
        source: &str,
        dest: &Path,
    ) -> Result<(), DockerError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let from = format!("{}:{VOLUME_MOUNT_POINT}/{source}", manager_name(volume_name));
        docker_ok(&["cp", &from, &dest.display().to_string()]).await?;
        Ok(())
    }

    /// Match a list of shell globs against the files in a volume, in a
    /// single round trip.
    ///
    /// Returns pattern → sorted list of matching relative paths. The manager
    /// container enumerates files with `find`; we use regex matching rather
    /// than `-path` because find's own wildcards match across `/`.
    pub async fn glob_volume_files(
        &self,
        volume_name: &str,
        patterns: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>, DockerError> {
        if patterns.is_empty() {
            return Ok(BTreeMap::new());
        }
        let manager = manager_name(volume_name);
        // `exec` needs a running container, even though the manager only sits
        // waiting for input. It gets stopped again when the volume's removal
        // force-removes it.
        docker_ok(&["container", "start", &manager]).await?;

        let mut find_args: Vec<String> =
            ["find", VOLUME_MOUNT_POINT, "-type", "f", "("].iter().map(|s| s.to_string()).collect();
        for pattern in patterns {
            find_args.push("-regex".to_string());
            find_args.push(glob_to_regex(&format!("{VOLUME_MOUNT_POINT}/{pattern}")));
            find_args.push("-o".to_string());
        }
        // Replace the final OR with the closing bracket
        if let Some(last) = find_args.last_mut() {
            *last = ")".to_string();
        }

        let mut args: Vec<&str> = vec!["container", "exec", &manager];
        args.extend(find_args.iter().map(String::as_str));
        let output = docker_ok(&args).await?;

        let prefix = format!("{VOLUME_MOUNT_POINT}/");
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut files: Vec<String> = stdout
            .lines()
            .filter_map(|line| line.strip_prefix(prefix.as_str()))
            .filter(|line| !line.is_empty())
            .map(|line| line.to_string())
            .collect();
        files.sort_unstable();

        let mut matches = BTreeMap::new();
        for pattern in patterns {
            let regex = regex::Regex::new(&format!("^(?:{})$", glob_to_regex(pattern)))
                .map_err(|_| DockerError::BadPattern(pattern.clone()))?;
            let matched = files.iter().filter(|f| regex.is_match(f)).cloned().collect();
            matches.insert(pattern.clone(), matched);
        }
        Ok(matches)
    }
}

/// Convert a shell glob (where `*` does not match `/`) into a regular
/// expression, escaping everything else literally.
pub fn glob_to_regex(glob: &str) -> String {
    glob.split('*').map(regex::escape).collect::<Vec<_>>().join("[^/]*")
}

#[cfg(test)]
#[path = "volumes_tests.rs"]
mod tests;
