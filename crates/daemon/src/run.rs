// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run loop: poll the store and drive each job one transition at a
//! time.
//!
//! Single-threaded and cooperative; containers do the actual work
//! concurrently while the loop only observes them. Only this loop ever
//! moves a job into a terminal state.

use crate::config::Config;
use crate::manage::{self, JobError, ManageError};
use crank_core::{minute_stamp, Clock, Job, State, SystemClock};
use crank_docker::ContainerRuntime;
use crank_store::{Filter, JobField, Store, StoreError};

/// Run forever, handling every pending and running job each interval.
/// Transient errors are logged and retried on the next pass; they never
/// mark a job terminal.
pub async fn main_loop(store: &Store, config: &Config, docker: &impl ContainerRuntime) {
    let clock = SystemClock;
    loop {
        match handle_jobs(store, config, docker, &clock).await {
            Ok(count) => tracing::debug!(jobs = count, "loop iteration complete"),
            Err(err) => tracing::error!(error = %err, "job loop iteration failed"),
        }
        tokio::time::sleep(config.job_loop_interval).await;
    }
}

/// One pass over all live jobs. Returns how many jobs were considered.
pub async fn handle_jobs(
    store: &Store,
    config: &Config,
    docker: &impl ContainerRuntime,
    clock: &impl Clock,
) -> Result<usize, ManageError> {
    let jobs =
        store.find_jobs_where(&[Filter::StatusIn(vec![State::Pending, State::Running])])?;
    let count = jobs.len();
    for mut job in jobs {
        match job.status {
            State::Pending => handle_pending_job(store, config, docker, clock, &mut job).await?,
            State::Running => handle_running_job(store, config, docker, clock, &mut job).await?,
            _ => {}
        }
    }
    Ok(count)
}

/// What to do with a pending job, given its dependencies and worker
/// capacity.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PendingDecision {
    DependencyFailed,
    WaitOnDependencies,
    WaitForWorkers,
    Start,
}

pub(crate) fn decide_pending(
    awaited: &[State],
    running: u64,
    max_workers: u32,
) -> PendingDecision {
    if awaited.contains(&State::Failed) {
        PendingDecision::DependencyFailed
    } else if awaited.iter().all(|state| *state == State::Completed) {
        if running >= u64::from(max_workers) {
            PendingDecision::WaitForWorkers
        } else {
            PendingDecision::Start
        }
    } else {
        PendingDecision::WaitOnDependencies
    }
}

async fn handle_pending_job(
    store: &Store,
    config: &Config,
    docker: &impl ContainerRuntime,
    clock: &impl Clock,
    job: &mut Job,
) -> Result<(), ManageError> {
    let awaited = store.select_statuses(&job.wait_for_job_ids)?;
    let running = store.count_jobs_where(&[Filter::Status(State::Running)])?;
    match decide_pending(&awaited, running, config.max_workers) {
        PendingDecision::DependencyFailed => {
            mark_job_as_failed(store, clock, job, &JobError::DependencyFailed)?;
        }
        PendingDecision::WaitOnDependencies => {
            update_status_message(store, clock, job, "Waiting on dependencies", true)?;
        }
        PendingDecision::WaitForWorkers => {
            update_status_message(store, clock, job, "Waiting for available workers", true)?;
        }
        PendingDecision::Start => {
            update_status_message(store, clock, job, "Starting", false)?;
            match manage::start_job(config, docker, job).await {
                Ok(()) => mark_job_as_running(store, clock, job)?,
                Err(ManageError::Job(err)) => {
                    mark_job_as_failed(store, clock, job, &err)?;
                    manage::cleanup_job(docker, job).await?;
                }
                Err(other) => return Err(other),
            }
        }
    }
    Ok(())
}

async fn handle_running_job(
    store: &Store,
    config: &Config,
    docker: &impl ContainerRuntime,
    clock: &impl Clock,
    job: &mut Job,
) -> Result<(), ManageError> {
    if docker.container_is_running(&job.container_name()).await? {
        update_status_message(store, clock, job, "Running", true)?;
        return Ok(());
    }

    update_status_message(store, clock, job, "Finished, copying outputs", false)?;
    let outcome = match manage::finalise_job(store, config, docker, clock, job).await {
        Ok(()) => {
            mark_job_as_completed(store, clock, job)?;
            Ok(())
        }
        Err(ManageError::Job(err)) => {
            mark_job_as_failed(store, clock, job, &err)?;
            Ok(())
        }
        Err(other) => Err(other),
    };
    // Cleanup runs whether finalisation succeeded, failed the job, or hit a
    // transient error; container and volume deletion are idempotent.
    manage::cleanup_job(docker, job).await?;
    outcome
}

fn mark_job_as_running(
    store: &Store,
    clock: &impl Clock,
    job: &mut Job,
) -> Result<(), StoreError> {
    let now = clock.now();
    job.status = State::Running;
    job.status_message = Some("Started".to_string());
    job.started_at = Some(now);
    job.updated_at = Some(now);
    store.update_job(
        job,
        &[JobField::Status, JobField::StatusMessage, JobField::StartedAt, JobField::UpdatedAt],
    )?;
    display(job);
    Ok(())
}

fn mark_job_as_completed(
    store: &Store,
    clock: &impl Clock,
    job: &mut Job,
) -> Result<(), StoreError> {
    let now = clock.now();
    job.status = State::Completed;
    job.status_message = Some("Completed successfully".to_string());
    job.completed_at = Some(now);
    job.updated_at = Some(now);
    store.update_job(
        job,
        &[JobField::Status, JobField::StatusMessage, JobField::CompletedAt, JobField::UpdatedAt],
    )?;
    display(job);
    Ok(())
}

fn mark_job_as_failed(
    store: &Store,
    clock: &impl Clock,
    job: &mut Job,
    error: &JobError,
) -> Result<(), StoreError> {
    let now = clock.now();
    job.status = State::Failed;
    job.status_message = Some(format!("{}: {}", error.kind(), error));
    job.completed_at = Some(now);
    job.updated_at = Some(now);
    store.update_job(
        job,
        &[JobField::Status, JobField::StatusMessage, JobField::CompletedAt, JobField::UpdatedAt],
    )?;
    display(job);
    Ok(())
}

/// Write a new status message, suppressing writes while nothing changes.
///
/// Jobs can sit waiting or running for a long time. Timestamped messages get
/// a minute-granularity suffix and are only written when the message minus
/// its final character changes, which works out to roughly one database
/// write per ten minutes per idle job while still letting users see the job
/// is alive.
fn update_status_message(
    store: &Store,
    clock: &impl Clock,
    job: &mut Job,
    message: &str,
    timestamped: bool,
) -> Result<(), StoreError> {
    let (message, changed) = if timestamped {
        let stamped = format!("{message} at {}", minute_stamp(clock.now()));
        let changed = match &job.status_message {
            Some(previous) => all_but_last_char(previous) != all_but_last_char(&stamped),
            None => true,
        };
        (stamped, changed)
    } else {
        (message.to_string(), job.status_message.as_deref() != Some(message))
    };
    if changed {
        job.status_message = Some(message);
        job.updated_at = Some(clock.now());
        store.update_job(job, &[JobField::StatusMessage, JobField::UpdatedAt])?;
        display(job);
    }
    Ok(())
}

fn all_but_last_char(s: &str) -> &str {
    match s.char_indices().last() {
        Some((index, _)) => &s[..index],
        None => s,
    }
}

fn display(job: &Job) {
    tracing::info!(
        job = %job.slug(),
        status = %job.status,
        "{}",
        job.status_message.as_deref().unwrap_or_default()
    );
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
