// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end expansion scenarios: request in, persisted DAG out.

use crate::prelude::*;
use crank_core::State;
use crank_daemon::create_or_update_jobs;
use crank_daemon::expand::create_jobs_with_project_file;
use crank_daemon::manifest::{write_manifest, ActionEntry, Manifest};
use crank_store::{Filter, Store};

#[test]
fn fresh_request_creates_the_dependency_dag() {
    let root = tempfile::tempdir().unwrap();
    let config = config_under(root.path());
    let store = Store::open(&config.database_file).unwrap();

    create_jobs_with_project_file(
        &store,
        &config,
        &request("req-1", &["analyse"]),
        PROJECT_YAML.as_bytes(),
    )
    .unwrap();

    let jobs = store.find_jobs_where(&[]).unwrap();
    assert_eq!(jobs.len(), 2);
    let generate = jobs.iter().find(|j| j.action == "generate_cohort").unwrap();
    let analyse = jobs.iter().find(|j| j.action == "analyse").unwrap();
    assert_eq!(generate.status, State::Pending);
    assert_eq!(analyse.status, State::Pending);
    assert_eq!(analyse.wait_for_job_ids, vec![generate.id.clone()]);

    // Both jobs resolve to a saved request (spec invariant)
    for job in &jobs {
        assert!(store.find_request(&job.job_request_id).unwrap().is_some());
    }
}

#[test]
fn resubmitting_before_completion_changes_nothing() {
    let root = tempfile::tempdir().unwrap();
    let config = config_under(root.path());
    let store = Store::open(&config.database_file).unwrap();
    let req = request("req-1", &["analyse"]);

    create_jobs_with_project_file(&store, &config, &req, PROJECT_YAML.as_bytes()).unwrap();
    let before = store.find_jobs_where(&[]).unwrap();

    create_jobs_with_project_file(&store, &config, &req, PROJECT_YAML.as_bytes()).unwrap();
    assert_eq!(store.find_jobs_where(&[]).unwrap(), before);
}

#[test]
fn at_most_one_live_job_per_workspace_action() {
    let root = tempfile::tempdir().unwrap();
    let config = config_under(root.path());
    let store = Store::open(&config.database_file).unwrap();

    create_jobs_with_project_file(
        &store,
        &config,
        &request("req-1", &["analyse"]),
        PROJECT_YAML.as_bytes(),
    )
    .unwrap();
    create_jobs_with_project_file(
        &store,
        &config,
        &request("req-2", &["generate_cohort"]),
        PROJECT_YAML.as_bytes(),
    )
    .unwrap();

    for action in ["generate_cohort", "analyse"] {
        let live = store
            .find_jobs_where(&[
                Filter::Action(action.to_string()),
                Filter::StatusIn(vec![State::Pending, State::Running]),
            ])
            .unwrap();
        assert_eq!(live.len(), 1, "one live job for {action}");
    }
}

#[test]
fn completed_dependency_is_satisfied_by_the_manifest() {
    let root = tempfile::tempdir().unwrap();
    let config = config_under(root.path());
    let store = Store::open(&config.database_file).unwrap();

    let workspace_dir = config.high_privacy_workspace("study-1");
    std::fs::create_dir_all(workspace_dir.join("output")).unwrap();
    std::fs::write(workspace_dir.join("output/input.csv"), "header\n").unwrap();
    let mut manifest = Manifest::default();
    manifest.record_run(
        "generate_cohort",
        &[("output/input.csv".to_string(), crank_core::PrivacyLevel::HighlySensitive)]
            .into_iter()
            .collect(),
        ActionEntry {
            status: State::Completed,
            commit: Some("abc123".to_string()),
            docker_image_id: Some("sha256:cafe".to_string()),
            job_id: "earlier-job".to_string(),
            run_by_user: Some("researcher".to_string()),
            created_at: 100,
            completed_at: Some(200),
        },
    );
    write_manifest(&workspace_dir, &manifest).unwrap();

    create_jobs_with_project_file(
        &store,
        &config,
        &request("req-1", &["analyse"]),
        PROJECT_YAML.as_bytes(),
    )
    .unwrap();

    let jobs = store.find_jobs_where(&[]).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].action, "analyse");
    assert!(jobs[0].wait_for_job_ids.is_empty());
}

#[test]
fn invalid_workspace_reports_one_failed_job() {
    let root = tempfile::tempdir().unwrap();
    let config = config_under(root.path());
    let store = Store::open(&config.database_file).unwrap();

    let mut req = request("req-1", &["analyse"]);
    req.workspace = "bad/name".to_string();
    create_jobs_with_project_file(&store, &config, &req, PROJECT_YAML.as_bytes()).unwrap();

    let jobs = store.find_jobs_where(&[]).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, State::Failed);
    assert_eq!(jobs[0].action, "");
    assert_eq!(
        jobs[0].status_message.as_deref(),
        Some(
            "JobRequestError: Invalid workspace name \
             (allowed are alphanumeric, dash and underscore)"
        )
    );
}

#[tokio::test]
async fn local_run_mode_reads_the_project_from_disk() {
    let root = tempfile::tempdir().unwrap();
    let mut config = config_under(root.path());
    config.local_run_mode = true;
    let store = Store::open(&config.database_file).unwrap();

    // In local-run mode the "repo" is just a directory with a project file
    let repo_dir = root.path().join("my study");
    std::fs::create_dir_all(&repo_dir).unwrap();
    std::fs::write(repo_dir.join("project.yaml"), PROJECT_YAML).unwrap();

    let mut req = request("req-1", &["analyse"]);
    req.repo_url = repo_dir.display().to_string();
    // Workspace names are unrestricted in local-run mode
    req.workspace = "my study".to_string();
    create_or_update_jobs(&store, &config, &req).await.unwrap();

    let jobs = store.find_jobs_where(&[]).unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == State::Pending));
}
