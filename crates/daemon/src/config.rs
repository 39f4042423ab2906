// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("could not parse {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: String,
    pub job_server_endpoint: String,
    pub queue_user: String,
    pub queue_pass: String,
    pub poll_interval: Duration,
    pub job_loop_interval: Duration,
    pub max_workers: u32,
    pub docker_registry: String,
    pub high_privacy_workspaces_dir: PathBuf,
    pub medium_privacy_workspaces_dir: Option<PathBuf>,
    pub job_log_dir: PathBuf,
    pub database_file: PathBuf,
    pub tmp_dir: PathBuf,
    pub local_run_mode: bool,
    pub using_dummy_data_backend: bool,
    pub temp_database_name: Option<String>,
    /// Human database name → connection URL. An empty URL means the name is
    /// known to this backend but not currently defined.
    pub database_urls: BTreeMap<String, String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            backend: required("BACKEND")?,
            job_server_endpoint: required("JOB_SERVER_ENDPOINT")?,
            queue_user: required("QUEUE_USER")?,
            queue_pass: required("QUEUE_PASS")?,
            poll_interval: secs("POLL_INTERVAL", 5)?,
            job_loop_interval: secs("JOB_LOOP_INTERVAL", 5)?,
            max_workers: parse("MAX_WORKERS", 10)?,
            docker_registry: required("DOCKER_REGISTRY")?,
            high_privacy_workspaces_dir: PathBuf::from(required("HIGH_PRIVACY_WORKSPACES_DIR")?),
            medium_privacy_workspaces_dir: optional("MEDIUM_PRIVACY_WORKSPACES_DIR")
                .map(PathBuf::from),
            job_log_dir: PathBuf::from(required("JOB_LOG_DIR")?),
            database_file: PathBuf::from(required("DATABASE_FILE")?),
            tmp_dir: PathBuf::from(required("TMP_DIR")?),
            local_run_mode: flag("LOCAL_RUN_MODE")?,
            using_dummy_data_backend: flag("USING_DUMMY_DATA_BACKEND")?,
            temp_database_name: optional("TEMP_DATABASE_NAME"),
            database_urls: parse_database_urls(&optional("DATABASE_URLS").unwrap_or_default()),
        })
    }

    pub fn high_privacy_workspace(&self, workspace: &str) -> PathBuf {
        self.high_privacy_workspaces_dir.join(workspace)
    }

    pub fn medium_privacy_workspace(&self, workspace: &str) -> Option<PathBuf> {
        self.medium_privacy_workspaces_dir.as_ref().map(|dir| dir.join(workspace))
    }

    pub fn database_url(&self, name: &str) -> Option<&str> {
        self.database_urls.get(name).map(String::as_str)
    }

    /// Image used for volume manager sidecars. Any image with `sh` and
    /// `find` would do; this one is guaranteed present wherever the runner
    /// is deployed.
    pub fn management_image(&self) -> String {
        format!("{}/cohortextractor", self.docker_registry)
    }

    /// Scratch directory for git checkouts and parent-directory stubs.
    pub fn scratch_dir(&self) -> &Path {
        &self.tmp_dir
    }
}

/// Parse the `DATABASE_URLS` value: comma-separated `name=url` pairs.
/// A pair without `=` maps the name to an empty URL.
pub fn parse_database_urls(value: &str) -> BTreeMap<String, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, url)) => (name.trim().to_string(), url.trim().to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).ok().filter(|v| !v.is_empty()).ok_or(ConfigError::Missing(name))
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn secs(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(parse(name, default)?))
}

fn parse<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => {
            value.parse().map_err(|_| ConfigError::Invalid { name, value: value.clone() })
        }
        None => Ok(default),
    }
}

fn flag(name: &'static str) -> Result<bool, ConfigError> {
    match optional(name).as_deref() {
        None => Ok(false),
        Some("true") | Some("True") | Some("1") => Ok(true),
        Some("false") | Some("False") | Some("0") => Ok(false),
        Some(other) => Err(ConfigError::Invalid { name, value: other.to_string() }),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
