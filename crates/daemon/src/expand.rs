// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request expansion: turn a job request plus a project file into persisted
//! jobs with correct dependency edges.
//!
//! Where the request itself is broken we create a single failed job carrying
//! the error details rather than returning an error: creating a job row is
//! the only channel back to the coordinator, and the user needs to see
//! something for every request they submitted.

use crate::config::Config;
use crate::git::{self, GitError};
use crate::manifest;
use crank_core::{Clock, Job, JobId, JobRequest, SavedJobRequest, State, SystemClock};
use crank_project::{parse_and_validate, Project, ProjectError};
use crank_store::{Filter, Store, StoreError, Tx};
use thiserror::Error;

/// Problems with the request itself, reported back via a failed job.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Workspace name cannot be blank")]
    BlankWorkspace,
    #[error("Invalid workspace name (allowed are alphanumeric, dash and underscore)")]
    InvalidWorkspaceName,
    #[error("Invalid database name '{name}', allowed are: {allowed}")]
    InvalidDatabaseName { name: String, allowed: String },
    #[error("Database name '{name}' is not currently defined for backend '{backend}'")]
    UndefinedDatabase { name: String, backend: String },
    #[error("{0} failed on a previous run and must be re-run")]
    PreviouslyFailed(String),
    #[error("All requested actions were already scheduled to run")]
    NothingToDo,
}

/// Internal error union for one expansion attempt. Everything except
/// `Store` is projected into a failed synthetic job.
#[derive(Debug, Error)]
enum CreateError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CreateError {
    /// The error-kind prefix shown to the coordinator.
    fn kind(&self) -> &'static str {
        match self {
            CreateError::Request(_) => "JobRequestError",
            CreateError::Git(_) => "GitError",
            CreateError::Project(_) => "ProjectValidationError",
            CreateError::Store(_) => "StoreError",
        }
    }
}

/// Create Jobs in response to a JobRequest. Idempotent: a request that
/// already has jobs is left untouched.
pub async fn create_or_update_jobs(
    store: &Store,
    config: &Config,
    request: &JobRequest,
) -> Result<(), StoreError> {
    if store.exists_job_where(&[Filter::JobRequestId(request.id.clone())])? {
        // Updates to existing requests are not currently supported. The
        // extension point is a `cancel` flag on the job row, checked by the
        // run loop each time it looks at the job.
        return Ok(());
    }
    match create_jobs(store, config, request).await {
        Ok(()) => Ok(()),
        Err(CreateError::Store(err)) => Err(err),
        Err(err) => {
            tracing::warn!(request = %request.id, error = %err, "request failed to expand");
            create_failed_job(store, request, &err)
        }
    }
}

async fn create_jobs(
    store: &Store,
    config: &Config,
    request: &JobRequest,
) -> Result<(), CreateError> {
    validate_job_request(config, request)?;
    let mut request = request.clone();
    // The coordinator is expected to start supplying commits eventually,
    // making this branch resolution redundant.
    if request.commit.is_none() {
        request.commit =
            Some(git::get_sha_from_remote_ref(&request.repo_url, &request.branch).await?);
    }
    let project_file = if config.local_run_mode {
        std::fs::read(std::path::Path::new(&request.repo_url).join("project.yaml"))
            .map_err(ProjectError::Read)?
    } else {
        let commit = request.commit.as_deref().unwrap_or_default();
        git::read_file_from_repo(config, &request.repo_url, commit, "project.yaml").await?
    };
    try_create_jobs_with_project_file(store, config, &request, &project_file)
}

/// The part of expansion that never talks to git, split out for easier
/// testing.
pub fn create_jobs_with_project_file(
    store: &Store,
    config: &Config,
    request: &JobRequest,
    project_file: &[u8],
) -> Result<(), StoreError> {
    match try_create_jobs_with_project_file(store, config, request, project_file) {
        Ok(()) => Ok(()),
        Err(CreateError::Store(err)) => Err(err),
        Err(err) => {
            tracing::warn!(request = %request.id, error = %err, "request failed to expand");
            create_failed_job(store, request, &err)
        }
    }
}

fn try_create_jobs_with_project_file(
    store: &Store,
    config: &Config,
    request: &JobRequest,
    project_file: &[u8],
) -> Result<(), CreateError> {
    if store.exists_job_where(&[Filter::JobRequestId(request.id.clone())])? {
        return Ok(());
    }
    validate_job_request(config, request)?;
    let project = parse_and_validate(project_file)?;
    let force = if request.force_run_dependencies {
        ForceSet::All
    } else {
        ForceSet::Only(&request.requested_actions)
    };
    store.transaction(|tx| {
        tx.insert_request(&SavedJobRequest {
            id: request.id.clone(),
            original: request.original.clone(),
        })?;
        let mut new_job_scheduled = false;
        for action in &request.requested_actions {
            let job = recursively_add_jobs(tx, config, request, &project, action, &force)?;
            // A job belonging to another request means we picked up an
            // existing scheduled job rather than creating a new one.
            if matches!(&job, Some(job) if job.job_request_id == request.id) {
                new_job_scheduled = true;
            }
        }
        if !new_job_scheduled {
            return Err(RequestError::NothingToDo.into());
        }
        Ok(())
    })
}

/// Wildcard or explicit set of actions that must run even when historical
/// outputs exist.
enum ForceSet<'a> {
    All,
    Only(&'a [String]),
}

impl ForceSet<'_> {
    fn contains(&self, action: &str) -> bool {
        match self {
            ForceSet::All => true,
            ForceSet::Only(actions) => actions.iter().any(|a| a == action),
        }
    }
}

fn recursively_add_jobs(
    tx: &Tx<'_>,
    config: &Config,
    request: &JobRequest,
    project: &Project,
    action: &str,
    force: &ForceSet<'_>,
) -> Result<Option<Job>, CreateError> {
    // Is there already an equivalent job scheduled to run?
    let already_active = tx.find_jobs_where(&[
        Filter::Workspace(request.workspace.clone()),
        Filter::Action(action.to_string()),
        Filter::StatusIn(vec![State::Pending, State::Running]),
    ])?;
    if let Some(job) = already_active.into_iter().next() {
        return Ok(Some(job));
    }

    if !force.contains(action) {
        let workspace_dir = config.high_privacy_workspace(&request.workspace);
        match manifest::action_has_successful_outputs(&workspace_dir, action) {
            // Dependency satisfied by historical output; nothing to do
            Some(true) => return Ok(None),
            Some(false) => {
                return Err(RequestError::PreviouslyFailed(action.to_string()).into());
            }
            None => {}
        }
    }

    let spec = project.action_spec(action)?;
    let mut wait_for_job_ids = Vec::new();
    for needed in &spec.needs {
        if let Some(job) = recursively_add_jobs(tx, config, request, project, needed, force)? {
            wait_for_job_ids.push(job.id.clone());
        }
    }

    let job = Job {
        id: JobId::new(),
        job_request_id: request.id.clone(),
        workspace: request.workspace.clone(),
        repo_url: request.repo_url.clone(),
        commit: request.commit.clone(),
        database_name: Some(request.database_name.clone()),
        action: action.to_string(),
        run_command: Some(spec.run),
        requires_outputs_from: spec.needs,
        wait_for_job_ids,
        output_spec: spec.outputs,
        status: State::Pending,
        status_message: None,
        created_at: SystemClock.now(),
        updated_at: None,
        started_at: None,
        completed_at: None,
    };
    tx.insert_job(&job)?;
    Ok(Some(job))
}

fn validate_job_request(config: &Config, request: &JobRequest) -> Result<(), RequestError> {
    if request.workspace.is_empty() {
        return Err(RequestError::BlankWorkspace);
    }
    // In local-run mode the workspace name is whatever the user's working
    // directory happens to be called. Otherwise these are externally
    // supplied strings that end up as paths, so be restrictive.
    if !config.local_run_mode
        && !request.workspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(RequestError::InvalidWorkspaceName);
    }
    let name = &request.database_name;
    if config.using_dummy_data_backend {
        if name != "dummy" {
            return Err(RequestError::InvalidDatabaseName {
                name: name.clone(),
                allowed: "dummy".to_string(),
            });
        }
        return Ok(());
    }
    match config.database_url(name) {
        None => Err(RequestError::InvalidDatabaseName {
            name: name.clone(),
            allowed: config.database_urls.keys().cloned().collect::<Vec<_>>().join(", "),
        }),
        Some("") => Err(RequestError::UndefinedDatabase {
            name: name.clone(),
            backend: config.backend.clone(),
        }),
        Some(_) => Ok(()),
    }
}

/// Record a broken request as a single failed job with an empty action, so
/// the failure can be synced back to the coordinator and shown to the user.
fn create_failed_job(
    store: &Store,
    request: &JobRequest,
    error: &CreateError,
) -> Result<(), StoreError> {
    let now = SystemClock.now();
    store.transaction(|tx| {
        tx.insert_request(&SavedJobRequest {
            id: request.id.clone(),
            original: request.original.clone(),
        })?;
        tx.insert_job(&Job {
            id: JobId::new(),
            job_request_id: request.id.clone(),
            workspace: request.workspace.clone(),
            repo_url: request.repo_url.clone(),
            commit: request.commit.clone(),
            database_name: Some(request.database_name.clone()),
            action: String::new(),
            run_command: None,
            requires_outputs_from: Vec::new(),
            wait_for_job_ids: Vec::new(),
            output_spec: crank_core::OutputSpec::new(),
            status: State::Failed,
            status_message: Some(format!("{}: {}", error.kind(), error)),
            created_at: now,
            updated_at: Some(now),
            started_at: None,
            completed_at: Some(now),
        })
    })
}

#[cfg(test)]
#[path = "expand_tests.rs"]
mod tests;
