// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safety specs: what survives a process restart.

use crate::prelude::*;
use crank_core::State;
use crank_daemon::expand::create_jobs_with_project_file;
use crank_store::{Filter, JobField, Store};

#[test]
fn jobs_survive_a_restart_in_their_last_committed_state() {
    let root = tempfile::tempdir().unwrap();
    let config = config_under(root.path());

    {
        let store = Store::open(&config.database_file).unwrap();
        create_jobs_with_project_file(
            &store,
            &config,
            &request("req-1", &["analyse"]),
            PROJECT_YAML.as_bytes(),
        )
        .unwrap();
        // Simulate the loop having started the dependency before a crash
        let mut generate = store
            .find_jobs_where(&[Filter::Action("generate_cohort".to_string())])
            .unwrap()
            .remove(0);
        generate.status = State::Running;
        generate.status_message = Some("Started".to_string());
        generate.started_at = Some(1_600_000_000);
        store
            .update_job(
                &generate,
                &[JobField::Status, JobField::StatusMessage, JobField::StartedAt],
            )
            .unwrap();
    }

    // A "restarted" process sees exactly the committed state
    let store = Store::open(&config.database_file).unwrap();
    let live = store
        .find_jobs_where(&[Filter::StatusIn(vec![State::Pending, State::Running])])
        .unwrap();
    assert_eq!(live.len(), 2);
    let generate = live.iter().find(|j| j.action == "generate_cohort").unwrap();
    assert_eq!(generate.status, State::Running);
    assert_eq!(generate.started_at, Some(1_600_000_000));
    let analyse = live.iter().find(|j| j.action == "analyse").unwrap();
    assert_eq!(analyse.status, State::Pending);
}

#[test]
fn interrupted_expansion_leaves_no_rows_behind() {
    let root = tempfile::tempdir().unwrap();
    let config = config_under(root.path());
    let store = Store::open(&config.database_file).unwrap();

    // The second action doesn't exist, so the whole expansion rolls back
    // and is replaced by a single failed job.
    create_jobs_with_project_file(
        &store,
        &config,
        &request("req-1", &["generate_cohort", "missing_action"]),
        PROJECT_YAML.as_bytes(),
    )
    .unwrap();

    let reopened = Store::open(&config.database_file).unwrap();
    let jobs = reopened.find_jobs_where(&[]).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, State::Failed);
    assert!(reopened.find_request("req-1").unwrap().is_some());
}
