// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::fake_runtime::FakeRuntime;
use crate::test_support::test_config;
use crank_core::{FakeClock, JobBuilder, JobId};
use crank_docker::Docker;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    no_dependencies_start = { &[], 0, PendingDecision::Start },
    all_completed_start = { &[State::Completed, State::Completed], 0, PendingDecision::Start },
    one_failed = { &[State::Completed, State::Failed], 0, PendingDecision::DependencyFailed },
    failed_beats_pending = { &[State::Pending, State::Failed], 0, PendingDecision::DependencyFailed },
    still_pending = { &[State::Completed, State::Pending], 0, PendingDecision::WaitOnDependencies },
    still_running = { &[State::Running], 0, PendingDecision::WaitOnDependencies },
    at_capacity = { &[State::Completed], 10, PendingDecision::WaitForWorkers },
    over_capacity = { &[], 11, PendingDecision::WaitForWorkers },
)]
fn pending_decisions(awaited: &[State], running: u64, expected: PendingDecision) {
    assert_eq!(decide_pending(awaited, running, 10), expected);
}

#[test]
fn capacity_boundary_is_strict() {
    assert_eq!(decide_pending(&[], 9, 10), PendingDecision::Start);
    assert_eq!(decide_pending(&[], 10, 10), PendingDecision::WaitForWorkers);
}

fn store_with(jobs: &[crank_core::Job]) -> Store {
    let store = Store::in_memory().unwrap();
    for job in jobs {
        store.insert_job(job).unwrap();
    }
    store
}

#[test]
fn timestamped_messages_are_suppressed_within_the_tens_window() {
    let store = store_with(&[]);
    // 2021-01-01 10:20:00 UTC
    let clock = FakeClock::at(1_609_496_400);
    let mut job = JobBuilder::default().build();
    store.insert_job(&job).unwrap();

    update_status_message(&store, &clock, &mut job, "Waiting on dependencies", true).unwrap();
    assert_eq!(
        job.status_message.as_deref(),
        Some("Waiting on dependencies at 2021-01-01 10:20")
    );
    let first_updated_at = job.updated_at;

    // A minute later only the final character of the stamp changes: no write
    clock.advance(60);
    update_status_message(&store, &clock, &mut job, "Waiting on dependencies", true).unwrap();
    assert_eq!(
        job.status_message.as_deref(),
        Some("Waiting on dependencies at 2021-01-01 10:20")
    );
    assert_eq!(job.updated_at, first_updated_at);

    // Ten minutes later the tens digit changes and the message is rewritten
    clock.advance(9 * 60);
    update_status_message(&store, &clock, &mut job, "Waiting on dependencies", true).unwrap();
    assert_eq!(
        job.status_message.as_deref(),
        Some("Waiting on dependencies at 2021-01-01 10:30")
    );
    let stored = store.find_jobs_where(&[]).unwrap().remove(0);
    assert_eq!(stored.status_message, job.status_message);
}

#[test]
fn changing_the_message_always_writes() {
    let store = store_with(&[]);
    let clock = FakeClock::at(1_609_496_400);
    let mut job = JobBuilder::default().build();
    store.insert_job(&job).unwrap();

    update_status_message(&store, &clock, &mut job, "Waiting on dependencies", true).unwrap();
    update_status_message(&store, &clock, &mut job, "Waiting for available workers", true).unwrap();
    assert_eq!(
        job.status_message.as_deref(),
        Some("Waiting for available workers at 2021-01-01 10:20")
    );
}

#[test]
fn plain_messages_write_once() {
    let store = store_with(&[]);
    let clock = FakeClock::at(1_000);
    let mut job = JobBuilder::default().build();
    store.insert_job(&job).unwrap();

    update_status_message(&store, &clock, &mut job, "Starting", false).unwrap();
    let first_updated_at = job.updated_at;
    clock.advance(500);
    update_status_message(&store, &clock, &mut job, "Starting", false).unwrap();
    assert_eq!(job.updated_at, first_updated_at);
}

#[test]
fn terminal_transitions_set_timestamps() {
    let store = store_with(&[]);
    let clock = FakeClock::at(5_000);
    let mut job = JobBuilder::default().status(State::Running).build();
    store.insert_job(&job).unwrap();

    mark_job_as_completed(&store, &clock, &mut job).unwrap();
    let stored = store.find_jobs_where(&[]).unwrap().remove(0);
    assert_eq!(stored.status, State::Completed);
    assert_eq!(stored.status_message.as_deref(), Some("Completed successfully"));
    assert_eq!(stored.completed_at, Some(5_000));
    assert_eq!(stored.updated_at, Some(5_000));
}

#[test]
fn failed_transition_formats_the_error_kind() {
    let store = store_with(&[]);
    let clock = FakeClock::at(5_000);
    let mut job = JobBuilder::default().build();
    store.insert_job(&job).unwrap();

    mark_job_as_failed(&store, &clock, &mut job, &JobError::NonZeroExitCode).unwrap();
    let stored = store.find_jobs_where(&[]).unwrap().remove(0);
    assert_eq!(stored.status, State::Failed);
    assert_eq!(
        stored.status_message.as_deref(),
        Some("JobError: Job exited with an error code")
    );
}

#[test]
fn running_transition_sets_started_at() {
    let store = store_with(&[]);
    let clock = FakeClock::at(7_000);
    let mut job = JobBuilder::default().build();
    store.insert_job(&job).unwrap();

    mark_job_as_running(&store, &clock, &mut job).unwrap();
    let stored = store.find_jobs_where(&[]).unwrap().remove(0);
    assert_eq!(stored.status, State::Running);
    assert_eq!(stored.status_message.as_deref(), Some("Started"));
    assert_eq!(stored.started_at, Some(7_000));
}

#[tokio::test]
async fn pending_job_fails_when_a_dependency_failed() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let docker = Docker::new(config.management_image());
    let clock = FakeClock::at(1_000);

    let dep = JobBuilder::default()
        .id(JobId::from_string("dep0000000000001"))
        .action("generate")
        .status(State::Failed)
        .build();
    let mut job = JobBuilder::default()
        .id(JobId::from_string("job0000000000001"))
        .action("analyse")
        .wait_for_job_ids(vec![dep.id.clone()])
        .build();
    let store = store_with(&[dep.clone(), job.clone()]);

    handle_pending_job(&store, &config, &docker, &clock, &mut job).await.unwrap();
    let stored = store
        .find_jobs_where(&[Filter::Action("analyse".to_string())])
        .unwrap()
        .remove(0);
    assert_eq!(stored.status, State::Failed);
    assert_eq!(
        stored.status_message.as_deref(),
        Some("JobError: Not starting as dependency failed")
    );
}

#[tokio::test]
async fn pending_job_waits_while_dependencies_run() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let docker = Docker::new(config.management_image());
    let clock = FakeClock::at(1_609_496_400);

    let dep = JobBuilder::default()
        .id(JobId::from_string("dep0000000000001"))
        .action("generate")
        .status(State::Running)
        .build();
    let mut job = JobBuilder::default()
        .id(JobId::from_string("job0000000000001"))
        .action("analyse")
        .wait_for_job_ids(vec![dep.id.clone()])
        .build();
    let store = store_with(&[dep, job.clone()]);

    handle_pending_job(&store, &config, &docker, &clock, &mut job).await.unwrap();
    assert_eq!(job.status, State::Pending);
    assert!(job.status_message.as_deref().unwrap().starts_with("Waiting on dependencies at"));
}

#[tokio::test]
async fn pending_job_waits_for_worker_capacity() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.max_workers = 1;
    let docker = Docker::new(config.management_image());
    let clock = FakeClock::at(1_609_496_400);

    let running = JobBuilder::default()
        .id(JobId::from_string("run0000000000001"))
        .action("other")
        .status(State::Running)
        .build();
    let mut job = JobBuilder::default()
        .id(JobId::from_string("job0000000000001"))
        .action("analyse")
        .build();
    let store = store_with(&[running, job.clone()]);

    handle_pending_job(&store, &config, &docker, &clock, &mut job).await.unwrap();
    assert_eq!(job.status, State::Pending);
    assert!(
        job.status_message.as_deref().unwrap().starts_with("Waiting for available workers at")
    );
}

fn running_job_fixture() -> (crank_core::Job, Store, FakeRuntime) {
    let mut output_spec = crank_core::OutputSpec::new();
    output_spec.insert(
        crank_core::PrivacyLevel::HighlySensitive,
        [("cohort".to_string(), "output/*.csv".to_string())].into_iter().collect(),
    );
    let job = JobBuilder::default()
        .id(JobId::from_string("run0000000000002"))
        .workspace("study-1")
        .action("generate")
        .status(State::Running)
        .output_spec(output_spec)
        .started_at(1_609_496_000)
        .build();
    let store = Store::in_memory().unwrap();
    store
        .insert_request(&crank_core::SavedJobRequest {
            id: job.job_request_id.clone(),
            original: json!({"identifier": "request-1"}),
        })
        .unwrap();
    store.insert_job(&job).unwrap();
    let fake = FakeRuntime::new();
    (job, store, fake)
}

#[tokio::test]
async fn running_job_with_live_container_just_logs() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let clock = FakeClock::at(1_609_496_625);
    let (mut job, store, fake) = running_job_fixture();
    // run() registers a container in the running state
    fake.run(
        &job.container_name(),
        &["image:v1".to_string()],
        (&job.volume_name(), "/workspace"),
        &std::collections::BTreeMap::new(),
        false,
    )
    .await
    .unwrap();

    handle_running_job(&store, &config, &fake, &clock, &mut job).await.unwrap();
    assert_eq!(job.status, State::Running);
    assert!(job.status_message.as_deref().unwrap().starts_with("Running at"));
    assert!(fake.container(&job.container_name()).is_some(), "no cleanup while running");
}

#[tokio::test]
async fn finished_job_is_finalised_completed_and_cleaned_up() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let clock = FakeClock::at(1_609_496_625);
    let (mut job, store, fake) = running_job_fixture();
    fake.add_exited_container(&job.container_name(), 0, "2021-01-01T10:00:00Z done\n");
    fake.volume_write(&job.volume_name(), "output/data.csv", b"patient_id\n");

    handle_running_job(&store, &config, &fake, &clock, &mut job).await.unwrap();

    let stored = store.find_jobs_where(&[]).unwrap().remove(0);
    assert_eq!(stored.status, State::Completed);
    assert_eq!(stored.status_message.as_deref(), Some("Completed successfully"));
    assert_eq!(stored.completed_at, Some(1_609_496_625));

    // Outputs landed and the container and volume are gone
    assert!(config.high_privacy_workspace("study-1").join("output/data.csv").exists());
    assert!(fake.container(&job.container_name()).is_none());
    assert!(!fake.has_volume(&job.volume_name()));
}

#[tokio::test]
async fn failed_container_marks_the_job_failed_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let clock = FakeClock::at(1_609_496_625);
    let (mut job, store, fake) = running_job_fixture();
    fake.add_exited_container(&job.container_name(), 1, "stack trace\n");
    fake.volume_write(&job.volume_name(), "output/data.csv", b"partial\n");

    handle_running_job(&store, &config, &fake, &clock, &mut job).await.unwrap();

    let stored = store.find_jobs_where(&[]).unwrap().remove(0);
    assert_eq!(stored.status, State::Failed);
    assert_eq!(
        stored.status_message.as_deref(),
        Some("JobError: Job exited with an error code")
    );
    // Partial outputs are still harvested for debugging
    assert!(config.high_privacy_workspace("study-1").join("output/data.csv").exists());
    assert!(fake.container(&job.container_name()).is_none());
}

#[tokio::test]
async fn vanished_container_fails_the_job() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let clock = FakeClock::at(1_609_496_625);
    let (mut job, store, fake) = running_job_fixture();

    handle_running_job(&store, &config, &fake, &clock, &mut job).await.unwrap();
    let stored = store.find_jobs_where(&[]).unwrap().remove(0);
    assert_eq!(stored.status, State::Failed);
    assert_eq!(
        stored.status_message.as_deref(),
        Some("JobError: Job container has vanished")
    );
}

#[tokio::test]
async fn handle_jobs_processes_every_live_job() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let clock = FakeClock::at(1_609_496_625);
    let (job, store, fake) = running_job_fixture();
    fake.add_exited_container(&job.container_name(), 0, "done\n");
    fake.volume_write(&job.volume_name(), "output/data.csv", b"x");

    let failed_dep = JobBuilder::default()
        .id(JobId::from_string("dep0000000000009"))
        .workspace("study-1")
        .action("earlier")
        .status(State::Failed)
        .build();
    store.insert_job(&failed_dep).unwrap();
    let waiting = JobBuilder::default()
        .id(JobId::from_string("wai0000000000001"))
        .workspace("study-1")
        .action("analyse")
        .wait_for_job_ids(vec![job.id.clone(), failed_dep.id.clone()])
        .build();
    store.insert_job(&waiting).unwrap();

    // Two live jobs this pass; the terminal dependency is not revisited
    let handled = handle_jobs(&store, &config, &fake, &clock).await.unwrap();
    assert_eq!(handled, 2);

    let jobs = store.find_jobs_where(&[]).unwrap();
    let finished = jobs.iter().find(|j| j.action == "generate").unwrap();
    assert_eq!(finished.status, State::Completed);
    let dependent = jobs.iter().find(|j| j.action == "analyse").unwrap();
    assert_eq!(dependent.status, State::Failed);
    assert_eq!(
        dependent.status_message.as_deref(),
        Some("JobError: Not starting as dependency failed")
    );
}
