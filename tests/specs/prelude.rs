// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the integration specs.

use crank_core::JobRequest;
use crank_daemon::config::Config;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const PROJECT_YAML: &str = r#"
version: "1.0"
actions:
  generate_cohort:
    run: cohortextractor:latest generate_cohort
    outputs:
      highly_sensitive:
        cohort: output/input.csv
  analyse:
    run: stata-mp:16 analysis.do
    needs: [generate_cohort]
    outputs:
      moderately_sensitive:
        figure: figures/*.png
"#;

/// A config whose directories all live under `root`.
pub fn config_under(root: &Path) -> Config {
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

pub fn request(id: &str, actions: &[&str]) -> JobRequest {
    JobRequest {
        id: id.to_string(),
        repo_url: "https://example.com/study.git".to_string(),
        commit: Some("abc123".to_string()),
        branch: "main".to_string(),
        workspace: "study-1".to_string(),
        database_name: "default".to_string(),
        requested_actions: actions.iter().map(|a| a.to_string()).collect(),
        force_run_dependencies: false,
        original: json!({
            "identifier": id,
            "requested_actions": actions,
            "created_by": "researcher",
        }),
    }
}
