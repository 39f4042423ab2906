// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for daemon unit tests.

use crate::config::Config;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// A config whose directories all live under `root`.
pub(crate) fn test_config(root: &Path) -> Config {
    Config {
        backend: "testing".to_string(),
        job_server_endpoint: "https://jobs.example.com/api/v1".to_string(),
        queue_user: "user".to_string(),
        queue_pass: "pass".to_string(),
        poll_interval: Duration::from_secs(1),
        job_loop_interval: Duration::from_secs(1),
        max_workers: 10,
        docker_registry: "registry.example.com".to_string(),
        high_privacy_workspaces_dir: root.join("high_privacy"),
        medium_privacy_workspaces_dir: Some(root.join("medium_privacy")),
        job_log_dir: root.join("logs"),
        database_file: root.join("db.sqlite"),
        tmp_dir: root.join("tmp"),
        local_run_mode: false,
        using_dummy_data_backend: false,
        temp_database_name: None,
        database_urls: BTreeMap::from([(
            "default".to_string(),
            "mssql://db/testing".to_string(),
        )]),
    }
}

/// In-memory stand-in for the docker CLI, implementing the same
/// [`ContainerRuntime`] contract the daemon runs against in production.
pub(crate) mod fake_runtime {
    use async_trait::async_trait;
    use crank_docker::{ContainerMetadata, ContainerRuntime, DockerError};
    use serde_json::json;
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct FakeContainer {
        pub running: bool,
        pub exit_code: i64,
        pub image_id: String,
        pub env: Vec<String>,
        pub args: Vec<String>,
        pub network: bool,
        pub logs: String,
    }

    #[derive(Default)]
    struct FakeState {
        // volume → relative path → content
        volumes: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
        containers: BTreeMap<String, FakeContainer>,
        images: BTreeSet<String>,
    }

    #[derive(Default)]
    pub struct FakeRuntime {
        state: Mutex<FakeState>,
    }

    impl FakeRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_image(&self, image: &str) {
            self.state.lock().unwrap().images.insert(image.to_string());
        }

        /// Register an exited container, as the run loop would find it after
        /// the compute work finished.
        pub fn add_exited_container(&self, name: &str, exit_code: i64, logs: &str) {
            self.state.lock().unwrap().containers.insert(
                name.to_string(),
                FakeContainer {
                    running: false,
                    exit_code,
                    image_id: "sha256:deadbeef".to_string(),
                    env: vec![
                        "PATH=/usr/bin".to_string(),
                        "DATABASE_URL=mssql://user:secret@db".to_string(),
                    ],
                    args: Vec::new(),
                    network: false,
                    logs: logs.to_string(),
                },
            );
        }

        pub fn mark_exited(&self, name: &str, exit_code: i64) {
            if let Some(container) = self.state.lock().unwrap().containers.get_mut(name) {
                container.running = false;
                container.exit_code = exit_code;
            }
        }

        pub fn volume_write(&self, volume: &str, path: &str, content: &[u8]) {
            self.state
                .lock()
                .unwrap()
                .volumes
                .entry(volume.to_string())
                .or_default()
                .insert(path.to_string(), content.to_vec());
        }

        pub fn volume_files(&self, volume: &str) -> Vec<String> {
            self.state
                .lock()
                .unwrap()
                .volumes
                .get(volume)
                .map(|files| files.keys().cloned().collect())
                .unwrap_or_default()
        }

        pub fn has_volume(&self, volume: &str) -> bool {
            self.state.lock().unwrap().volumes.contains_key(volume)
        }

        pub fn container(&self, name: &str) -> Option<FakeContainer> {
            self.state.lock().unwrap().containers.get(name).cloned()
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn create_volume(&self, volume_name: &str) -> Result<(), DockerError> {
            self.state.lock().unwrap().volumes.entry(volume_name.to_string()).or_default();
            Ok(())
        }

        async fn delete_volume(&self, volume_name: &str) -> Result<(), DockerError> {
            self.state.lock().unwrap().volumes.remove(volume_name);
            Ok(())
        }

        async fn copy_to_volume(
            &self,
            volume_name: &str,
            source: &Path,
            dest: &str,
        ) -> Result<(), DockerError> {
            let mut entries = Vec::new();
            if source.is_dir() {
                collect_files(source, source, &mut entries)?;
            } else {
                entries.push((dest.to_string(), std::fs::read(source)?));
            }
            let mut state = self.state.lock().unwrap();
            let volume = state.volumes.entry(volume_name.to_string()).or_default();
            for (path, content) in entries {
                let path = if source.is_dir() && dest != "." {
                    format!("{dest}/{path}")
                } else {
                    path
                };
                volume.insert(path, content);
            }
            Ok(())
        }

        async fn copy_from_volume(
            &self,
            volume_name: &str,
            source: &str,
            dest: &Path,
        ) -> Result<(), DockerError> {
            let content = self
                .state
                .lock()
                .unwrap()
                .volumes
                .get(volume_name)
                .and_then(|files| files.get(source))
                .cloned()
                .ok_or_else(|| DockerError::Command {
                    command: "cp".to_string(),
                    stderr: format!("no such file: {source}"),
                })?;
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(dest, content)?;
            Ok(())
        }

        async fn glob_volume_files(
            &self,
            volume_name: &str,
            patterns: &[String],
        ) -> Result<BTreeMap<String, Vec<String>>, DockerError> {
            let state = self.state.lock().unwrap();
            let files: Vec<&String> =
                state.volumes.get(volume_name).map(|f| f.keys().collect()).unwrap_or_default();
            let mut matches = BTreeMap::new();
            for pattern in patterns {
                let regex = regex::Regex::new(&format!(
                    "^(?:{})$",
                    crank_docker::volumes::glob_to_regex(pattern)
                ))
                .map_err(|_| DockerError::BadPattern(pattern.clone()))?;
                let mut matched: Vec<String> =
                    files.iter().filter(|f| regex.is_match(f)).map(|f| f.to_string()).collect();
                matched.sort();
                matches.insert(pattern.clone(), matched);
            }
            Ok(matches)
        }

        async fn run(
            &self,
            name: &str,
            args: &[String],
            _volume: (&str, &str),
            env: &BTreeMap<String, String>,
            allow_network_access: bool,
        ) -> Result<(), DockerError> {
            self.state.lock().unwrap().containers.insert(
                name.to_string(),
                FakeContainer {
                    running: true,
                    exit_code: 0,
                    image_id: format!("sha256:{}", args.first().cloned().unwrap_or_default()),
                    env: env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
                    args: args.to_vec(),
                    network: allow_network_access,
                    logs: String::new(),
                },
            );
            Ok(())
        }

        async fn container_inspect(
            &self,
            name: &str,
        ) -> Result<Option<ContainerMetadata>, DockerError> {
            Ok(self.state.lock().unwrap().containers.get(name).map(|container| {
                ContainerMetadata {
                    raw: json!({
                        "Image": container.image_id,
                        "State": {
                            "ExitCode": container.exit_code,
                            "Running": container.running,
                        },
                        "Config": {"Env": container.env},
                    }),
                }
            }))
        }

        async fn delete_container(&self, name: &str) -> Result<(), DockerError> {
            self.state.lock().unwrap().containers.remove(name);
            Ok(())
        }

        async fn write_logs_to_file(&self, name: &str, path: &Path) -> Result<(), DockerError> {
            let logs = self
                .state
                .lock()
                .unwrap()
                .containers
                .get(name)
                .map(|c| c.logs.clone())
                .ok_or_else(|| DockerError::Command {
                    command: "container logs".to_string(),
                    stderr: format!("No such container: {name}"),
                })?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, logs)?;
            Ok(())
        }

        async fn image_exists_locally(&self, image: &str) -> Result<bool, DockerError> {
            Ok(self.state.lock().unwrap().images.contains(image))
        }

        async fn pull(&self, image: &str) -> Result<(), DockerError> {
            self.add_image(image);
            Ok(())
        }
    }

    fn collect_files(
        root: &Path,
        dir: &Path,
        entries: &mut Vec<(String, Vec<u8>)>,
    ) -> Result<(), std::io::Error> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                collect_files(root, &entry.path(), entries)?;
            } else {
                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .map(|p| {
                        p.components()
                            .map(|c| c.as_os_str().to_string_lossy().into_owned())
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                    .unwrap_or_default();
                entries.push((relative, std::fs::read(&entry.path())?));
            }
        }
        Ok(())
    }
}

/// Create a git repository at `dir` with one commit containing `files`.
/// Returns nothing; resolve HEAD via `git ls-remote` where needed.
pub(crate) fn init_git_repo(dir: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create repo subdir");
        }
        std::fs::write(path, content).expect("write repo file");
    }
    for args in [
        vec!["init", "--quiet"],
        vec!["config", "user.email", "tests@example.com"],
        vec!["config", "user.name", "Tests"],
        vec!["add", "."],
        vec!["commit", "--quiet", "-m", "initial"],
    ] {
        let status = std::process::Command::new("git")
            .args(&args)
            .current_dir(dir)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .status()
            .expect("run git");
        assert!(status.success(), "git {args:?} failed");
    }
}
