// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Poll the coordinator for active job requests and report job snapshots
//! back.

use crate::config::Config;
use crate::expand::create_or_update_jobs;
use crank_core::{Job, JobRequest, State};
use crank_store::{Filter, Store, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("coordinator request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unexpected coordinator payload: {0}")]
    BadPayload(String),
}

/// Poll forever. Errors are logged and the next cycle retried.
pub async fn main_loop(store: &Store, config: &Config) {
    let client = reqwest::Client::new();
    loop {
        if let Err(err) = sync_once(&client, store, config).await {
            tracing::error!(error = %err, "sync cycle failed");
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}

/// One sync cycle: fetch active requests, expand each, post back snapshots
/// of every job belonging to an active request.
pub async fn sync_once(
    client: &reqwest::Client,
    store: &Store,
    config: &Config,
) -> Result<(), SyncError> {
    let endpoint = config.job_server_endpoint.trim_end_matches('/');

    let response = client
        .get(format!("{endpoint}/job-requests/"))
        .query(&[("active", "true"), ("backend", config.backend.as_str())])
        .basic_auth(&config.queue_user, Some(&config.queue_pass))
        .send()
        .await?;
    if response.status() == reqwest::StatusCode::BAD_REQUEST {
        let body = response.text().await.unwrap_or_default();
        tracing::info!(%body, "coordinator returned 400");
        return Ok(());
    }
    let response = response.error_for_status()?;
    // Deliberately not paginating: the set of active requests stays small
    // enough to fetch in one go.
    let body: JobRequestsResponse = response.json().await?;

    let requests: Vec<JobRequest> = body
        .results
        .iter()
        .map(job_request_from_remote)
        .collect::<Result<_, _>>()
        .map_err(SyncError::BadPayload)?;

    for request in &requests {
        create_or_update_jobs(store, config, request).await?;
    }

    let request_ids: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
    let jobs = store.find_jobs_where(&[Filter::JobRequestIdIn(request_ids)])?;
    let snapshots: Vec<JobSnapshot> = jobs.iter().map(job_to_remote).collect();

    let response = client
        .post(format!("{endpoint}/jobs/"))
        .basic_auth(&config.queue_user, Some(&config.queue_pass))
        .json(&snapshots)
        .send()
        .await?;
    if response.status() == reqwest::StatusCode::BAD_REQUEST {
        let body = response.text().await.unwrap_or_default();
        tracing::info!(%body, "coordinator returned 400");
        return Ok(());
    }
    response.error_for_status()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct JobRequestsResponse {
    results: Vec<serde_json::Value>,
}

/// The workspace block of a coordinator job-request payload.
#[derive(Debug, Deserialize)]
struct RemoteWorkspace {
    repo: String,
    branch: String,
    name: String,
    db: String,
}

#[derive(Debug, Deserialize)]
struct RemoteJobRequest {
    identifier: serde_json::Value,
    #[serde(default)]
    sha: Option<String>,
    workspace: RemoteWorkspace,
    requested_actions: Vec<String>,
    #[serde(default)]
    force_run_dependencies: bool,
}

/// Convert a job request as received from the coordinator into our internal
/// representation, keeping the raw payload alongside.
pub(crate) fn job_request_from_remote(value: &serde_json::Value) -> Result<JobRequest, String> {
    let remote: RemoteJobRequest =
        serde_json::from_value(value.clone()).map_err(|err| err.to_string())?;
    let id = match &remote.identifier {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => return Err(format!("unexpected identifier: {other}")),
    };
    Ok(JobRequest {
        id,
        repo_url: remote.workspace.repo,
        commit: remote.sha.filter(|sha| !sha.is_empty()),
        branch: remote.workspace.branch,
        workspace: remote.workspace.name,
        database_name: remote.workspace.db,
        requested_actions: remote.requested_actions,
        force_run_dependencies: remote.force_run_dependencies,
        original: value.clone(),
    })
}

/// The trimmed job projection the coordinator accepts.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct JobSnapshot {
    pub id: String,
    pub job_request_id: String,
    pub action: String,
    pub status: State,
    pub status_message: Option<String>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

pub(crate) fn job_to_remote(job: &Job) -> JobSnapshot {
    JobSnapshot {
        id: job.id.to_string(),
        job_request_id: job.job_request_id.clone(),
        action: job.action.clone(),
        status: job.status,
        status_message: job.status_message.clone(),
        created_at: job.created_at,
        updated_at: job.updated_at,
        started_at: job.started_at,
        completed_at: job.completed_at,
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
