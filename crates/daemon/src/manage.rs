// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Starting jobs in containers and dealing with them when they finish.
//!
//! `start_job` and `finalise_job` are idempotent: the daemon can be killed
//! at any point and converges to a consistent state when restarted.

use crate::config::Config;
use crate::git::{self, GitError};
use crate::manifest::{self, ActionEntry, ManifestError, OutputsError, METADATA_DIR};
use crate::metadata;
use crank_core::{Clock, Job, PrivacyLevel, State};
use crank_docker::{ContainerRuntime, DockerError};
use crank_project::{is_generate_cohort_command, split_command, ProjectError};
use crank_store::{Store, StoreError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures that mark the job itself as failed, with a message aimed at the
/// study author.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job exited with an error code")]
    NonZeroExitCode,
    #[error("No outputs found matching: {0}")]
    MissingOutputs(String),
    #[error("Job container has vanished")]
    ContainerVanished,
    #[error("Docker image {0} is not currently available")]
    ImageUnavailable(String),
    #[error("Not starting as dependency failed")]
    DependencyFailed,
    #[error("Job has an invalid run command")]
    InvalidRunCommand,
    #[error("Job has no resolved commit")]
    MissingCommit,
    #[error("Database name '{0}' is not configured")]
    UnknownDatabase(String),
    #[error(transparent)]
    MissingDependencyOutputs(#[from] OutputsError),
}

impl JobError {
    /// Error-kind prefix used in the job's status message.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::MissingDependencyOutputs(OutputsError::ActionNotRun(_)) => {
                "ActionNotRunError"
            }
            JobError::MissingDependencyOutputs(OutputsError::ActionFailed(_)) => {
                "ActionFailedError"
            }
            JobError::MissingDependencyOutputs(OutputsError::MissingOutput { .. }) => {
                "MissingOutputError"
            }
            _ => "JobError",
        }
    }
}

/// Union of job failures and transient infrastructure failures. The run
/// loop marks the job failed for `Job`, and retries the iteration for
/// everything else.
#[derive(Debug, Error)]
pub enum ManageError {
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Docker(#[from] DockerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("could not serialise job metadata: {0}")]
    Serialise(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A dependency-output problem is a job failure, except when the manifest
/// itself could not be read, which is infrastructure.
fn outputs_error(err: OutputsError) -> ManageError {
    match err {
        OutputsError::Manifest(err) => ManageError::Manifest(err),
        other => ManageError::Job(other.into()),
    }
}

/// Start the job's container, creating and populating its volume first.
pub async fn start_job(config: &Config, docker: &impl ContainerRuntime, job: &Job) -> Result<(), ManageError> {
    // If we already created the container but were killed before updating
    // the job state then there's nothing further to do
    if docker.container_exists(&job.container_name()).await? {
        tracing::info!(job = %job.slug(), "Container already created, nothing to do");
        return Ok(());
    }
    let volume = create_and_populate_volume(config, docker, job).await?;

    let run_command = job.run_command.as_deref().ok_or(JobError::InvalidRunCommand)?;
    let action_args = split_command(run_command).map_err(|_| JobError::InvalidRunCommand)?;
    let image = action_args.first().ok_or(JobError::InvalidRunCommand)?.clone();

    let mut allow_network_access = false;
    let mut env = BTreeMap::new();
    if !config.using_dummy_data_backend && is_generate_cohort_command(&action_args) {
        allow_network_access = true;
        let database_name = job.database_name.clone().unwrap_or_default();
        let url = config
            .database_url(&database_name)
            .ok_or_else(|| JobError::UnknownDatabase(database_name.clone()))?;
        env.insert("DATABASE_URL".to_string(), url.to_string());
        if let Some(temp_database_name) = &config.temp_database_name {
            env.insert("TEMP_DATABASE_NAME".to_string(), temp_database_name.clone());
        }
    }

    // Containers never pull for themselves, so a missing image is an
    // immediate job failure rather than a long wait inside docker run.
    let full_image = format!("{}/{}", config.docker_registry, image);
    if !docker.image_exists_locally(&full_image).await? {
        tracing::warn!(job = %job.slug(), image = %full_image, "image not found locally");
        return Err(JobError::ImageUnavailable(image).into());
    }

    let mut args = vec![full_image];
    args.extend(action_args.into_iter().skip(1));
    docker
        .run(
            &job.container_name(),
            &args,
            (volume.as_str(), crank_docker::VOLUME_MOUNT_POINT),
            &env,
            allow_network_access,
        )
        .await?;
    tracing::info!(job = %job.slug(), container = %job.container_name(), "started");
    Ok(())
}

async fn create_and_populate_volume(
    config: &Config,
    docker: &impl ContainerRuntime,
    job: &Job,
) -> Result<String, ManageError> {
    if config.local_run_mode {
        return create_and_populate_volume_from_local_workspace(config, docker, job).await;
    }

    let workspace_dir = config.high_privacy_workspace(&job.workspace);
    let mut input_files = Vec::new();
    for action in &job.requires_outputs_from {
        input_files.extend(
            manifest::list_outputs_from_action(&workspace_dir, action, false)
                .map_err(outputs_error)?,
        );
    }

    let volume = job.volume_name();
    docker.create_volume(&volume).await?;

    let commit = job.commit.as_deref().ok_or(JobError::MissingCommit)?;
    tracing::info!(job = %job.slug(), repo = %job.repo_url, %commit, "copying in code");
    std::fs::create_dir_all(config.scratch_dir())?;
    let checkout = tempfile::tempdir_in(config.scratch_dir())?;
    git::checkout_commit(config, &job.repo_url, commit, checkout.path()).await?;
    // `docker cp` can't create parent directories, so make sure they exist
    // for all the input files we're about to copy in
    make_parent_stubs(checkout.path(), &input_files)?;
    docker.copy_to_volume(&volume, checkout.path(), ".").await?;

    for filename in &input_files {
        tracing::info!(job = %job.slug(), file = %filename, "copying input file");
        docker.copy_to_volume(&volume, &workspace_dir.join(filename), filename).await?;
    }
    Ok(volume)
}

/// Local-run variant: populate the volume from the local workspace
/// directory instead of a git checkout. Output files only appear in the
/// volume if an explicitly listed dependency produced them, so everything
/// matching a project output pattern is ignored when copying code in.
async fn create_and_populate_volume_from_local_workspace(
    config: &Config,
    docker: &impl ContainerRuntime,
    job: &Job,
) -> Result<String, ManageError> {
    let workspace_dir = config.high_privacy_workspace(&job.workspace);

    let mut ignore_patterns =
        crank_project::all_output_patterns_from_file(&workspace_dir.join("project.yaml"))?;
    ignore_patterns.push(".git".to_string());
    ignore_patterns.push(METADATA_DIR.to_string());
    let code_files = list_dir_with_ignore_patterns(&workspace_dir, &ignore_patterns)?;

    let mut input_files = Vec::new();
    for action in &job.requires_outputs_from {
        input_files.extend(
            manifest::list_outputs_from_action(&workspace_dir, action, false)
                .map_err(outputs_error)?,
        );
    }

    let volume = job.volume_name();
    docker.create_volume(&volume).await?;

    let stubs = tempfile::tempdir()?;
    let mut all_files: Vec<String> = code_files.clone();
    all_files.extend(input_files.iter().cloned());
    make_parent_stubs(stubs.path(), &all_files)?;
    docker.copy_to_volume(&volume, stubs.path(), ".").await?;

    tracing::info!(job = %job.slug(), dir = %workspace_dir.display(), "copying in code");
    for filename in code_files.iter().chain(&input_files) {
        docker.copy_to_volume(&volume, &workspace_dir.join(filename), filename).await?;
    }
    Ok(volume)
}

/// Create empty parent directories under `root` for each relative file path.
fn make_parent_stubs(root: &Path, files: &[String]) -> Result<(), std::io::Error> {
    let parents: BTreeSet<&Path> =
        files.iter().filter_map(|f| Path::new(f).parent()).filter(|p| !p.as_os_str().is_empty()).collect();
    for parent in parents {
        std::fs::create_dir_all(root.join(parent))?;
    }
    Ok(())
}

/// Recursively list files under `dir` (as relative paths with forward
/// slashes), skipping anything matching an ignore pattern, including whole
/// subtrees whose directory matches.
fn list_dir_with_ignore_patterns(
    dir: &Path,
    ignore_patterns: &[String],
) -> Result<Vec<String>, std::io::Error> {
    let patterns: Vec<glob::Pattern> =
        ignore_patterns.iter().filter_map(|p| glob::Pattern::new(p).ok()).collect();
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let ignored =
        |relative: &str| patterns.iter().any(|p| p.matches_with(relative, options));

    let mut files = Vec::new();
    let mut stack = vec![PathBuf::new()];
    while let Some(relative_dir) = stack.pop() {
        for entry in std::fs::read_dir(dir.join(&relative_dir))? {
            let entry = entry?;
            let relative = relative_dir.join(entry.file_name());
            let relative_str = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if ignored(&relative_str) {
                continue;
            }
            if entry.file_type()?.is_dir() {
                stack.push(relative);
            } else {
                files.push(relative_str);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Check whether the job finished successfully, extract all outputs, logs
/// and metadata, and update both workspaces and the manifest.
pub async fn finalise_job(
    store: &Store,
    config: &Config,
    docker: &impl ContainerRuntime,
    clock: &impl Clock,
    job: &Job,
) -> Result<(), ManageError> {
    let container_metadata = match docker.container_inspect(&job.container_name()).await? {
        Some(metadata) => metadata,
        None => return Err(JobError::ContainerVanished.into()),
    };
    let mut raw_metadata = container_metadata.raw.clone();
    metadata::redact_environment_variables(&mut raw_metadata);

    let (outputs, unmatched_patterns) = find_matching_outputs(docker, job).await?;

    // For most classes of error we still want to extract outputs and logs
    // for debugging, so the error is classified now, threaded through the
    // metadata for correct on-disk state, and only raised at the end.
    let error = if container_metadata.exit_code() != 0 {
        Some(JobError::NonZeroExitCode)
    } else if !unmatched_patterns.is_empty() {
        Some(JobError::MissingOutputs(unmatched_patterns.join(", ")))
    } else {
        None
    };

    let request = store
        .find_request(&job.job_request_id)?
        .unwrap_or_else(|| crank_core::SavedJobRequest {
            id: job.job_request_id.clone(),
            original: serde_json::Value::Null,
        });
    let (final_status, final_message) = match &error {
        Some(err) => (State::Failed, format!("{}: {}", err.kind(), err)),
        None => (State::Completed, "Completed successfully".to_string()),
    };
    let job_metadata = metadata::build_job_metadata(
        job,
        &request,
        &raw_metadata,
        container_metadata.image_id(),
        &outputs,
        final_status,
        &final_message,
        clock.now(),
    );

    // Dump useful info in the log directory
    let log_dir = log_dir_for(config, clock, job);
    let log_file = log_dir.join("logs.txt");
    docker.write_logs_to_file(&job.container_name(), &log_file).await?;
    append_to_file(&log_file, &metadata::log_file_trailer(&job_metadata))?;
    std::fs::write(log_dir.join("metadata.json"), serde_json::to_vec_pretty(&job_metadata)?)?;

    // Copy logs to the workspace
    let workspace_dir = config.high_privacy_workspace(&job.workspace);
    let workspace_log = workspace_dir.join(METADATA_DIR).join(format!("{}.log", job.action));
    copy_file(&log_file, &workspace_log)?;
    tracing::info!(job = %job.slug(), path = %workspace_log.display(), "logs written");

    // Extract outputs to the workspace
    let volume = job.volume_name();
    for filename in outputs.keys() {
        tracing::info!(job = %job.slug(), file = %filename, "extracting output file");
        docker.copy_from_volume(&volume, filename, &workspace_dir.join(filename)).await?;
    }

    // Delete outputs left over from a previous run of this action; a
    // missing or unreadable manifest just means nothing to prune
    let existing_files =
        manifest::list_outputs_from_action(&workspace_dir, &job.action, true).unwrap_or_default();
    let files_to_remove: Vec<String> =
        existing_files.into_iter().filter(|f| !outputs.contains_key(f)).collect();
    delete_files(&workspace_dir, &files_to_remove)?;

    let mut workspace_manifest = manifest::read_manifest(&workspace_dir)?;
    workspace_manifest.record_run(
        &job.action,
        &outputs,
        ActionEntry {
            status: final_status,
            commit: job.commit.clone(),
            docker_image_id: container_metadata.image_id().map(str::to_string),
            job_id: job.id.to_string(),
            run_by_user: request.original.get("created_by").and_then(|v| v.as_str()).map(str::to_string),
            created_at: job.created_at,
            completed_at: job_metadata.get("completed_at").and_then(|v| v.as_i64()),
        },
    );

    // Copy out logs and medium privacy files
    if let Some(medium_dir) = config.medium_privacy_workspace(&job.workspace) {
        copy_file(
            &workspace_log,
            &medium_dir.join(METADATA_DIR).join(format!("{}.log", job.action)),
        )?;
        for (filename, privacy_level) in &outputs {
            if *privacy_level == PrivacyLevel::ModeratelySensitive {
                copy_file(&workspace_dir.join(filename), &medium_dir.join(filename))?;
            }
        }
        delete_files(&medium_dir, &files_to_remove)?;
        manifest::write_manifest(&medium_dir, &workspace_manifest)?;
    }

    // The primary manifest is written only after old files are deleted from
    // both directories, else an interruption could lose track of old files
    manifest::write_manifest(&workspace_dir, &workspace_manifest)?;

    match error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Remove the job's container and volume. Idempotent.
pub async fn cleanup_job(docker: &impl ContainerRuntime, job: &Job) -> Result<(), DockerError> {
    tracing::info!(job = %job.slug(), "cleaning up container and volume");
    docker.delete_container(&job.container_name()).await?;
    docker.delete_volume(&job.volume_name()).await?;
    Ok(())
}

/// Match the job's output spec against the volume, in one round trip.
///
/// Returns path → privacy level, plus any patterns with no matches at all.
/// A file matching patterns under two privacy levels resolves to whichever
/// level sorts last.
async fn find_matching_outputs(
    docker: &impl ContainerRuntime,
    job: &Job,
) -> Result<(BTreeMap<String, PrivacyLevel>, Vec<String>), DockerError> {
    let all_patterns = crank_core::all_patterns(&job.output_spec);
    let all_matches = docker.glob_volume_files(&job.volume_name(), &all_patterns).await?;
    let mut unmatched_patterns = Vec::new();
    let mut outputs = BTreeMap::new();
    for (privacy_level, named_patterns) in &job.output_spec {
        for pattern in named_patterns.values() {
            let filenames = all_matches.get(pattern).cloned().unwrap_or_default();
            if filenames.is_empty() {
                unmatched_patterns.push(pattern.clone());
            }
            for filename in filenames {
                outputs.insert(filename, *privacy_level);
            }
        }
    }
    Ok((outputs, unmatched_patterns))
}

/// Log directory for one run: `JOB_LOG_DIR/YYYY-MM/<container name>`.
/// Split by month to keep directory sizes manageable.
fn log_dir_for(config: &Config, clock: &impl Clock, job: &Job) -> PathBuf {
    let month = match chrono::DateTime::from_timestamp(clock.now(), 0) {
        Some(dt) => dt.format("%Y-%m").to_string(),
        None => "unknown".to_string(),
    };
    config.job_log_dir.join(month).join(job.container_name())
}

fn copy_file(source: &Path, dest: &Path) -> Result<(), std::io::Error> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(source, dest)?;
    Ok(())
}

fn append_to_file(path: &Path, content: &str) -> Result<(), std::io::Error> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    file.write_all(content.as_bytes())
}

fn delete_files(directory: &Path, filenames: &[String]) -> Result<(), std::io::Error> {
    for filename in filenames {
        match std::fs::remove_file(directory.join(filename)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "manage_tests.rs"]
mod tests;
