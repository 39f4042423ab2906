// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job record and its state machine.

use crate::id::JobId;
use crate::output::OutputSpec;
use crate::slug::slugify;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// `Pending` → `Running` → `Completed` | `Failed`. Terminal states never
/// mutate; a re-run is always a new job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Pending,
    Running,
    Completed,
    Failed,
}

impl State {
    /// Tag value used in the store and in coordinator payloads.
    pub fn tag(&self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Running => "running",
            State::Completed => "completed",
            State::Failed => "failed",
        }
    }

    /// Parse a persisted tag value.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "pending" => Some(State::Pending),
            "running" => Some(State::Running),
            "completed" => Some(State::Completed),
            "failed" => Some(State::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

crate::simple_display! {
    State {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

/// One scheduled execution of a project action.
///
/// Created by the expander, driven through its lifecycle by the run loop.
/// The run loop mutates only `status`, `status_message`, `updated_at`,
/// `started_at` and `completed_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_request_id: String,
    pub workspace: String,
    pub repo_url: String,
    pub commit: Option<String>,
    pub database_name: Option<String>,
    /// Action name within the project file; empty on the synthetic job that
    /// reports a broken request back to the coordinator.
    pub action: String,
    /// The action's `run` command, shell-split only when the container is
    /// started.
    pub run_command: Option<String>,
    /// Actions whose outputs must be copied into this job's volume.
    pub requires_outputs_from: Vec<String>,
    /// Jobs that must reach `Completed` before this job may start.
    pub wait_for_job_ids: Vec<JobId>,
    pub output_spec: OutputSpec,
    pub status: State,
    pub status_message: Option<String>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Job {
    /// Human-readable name component derived from workspace, action and id.
    ///
    /// The slug (rather than the opaque id alone) names containers and
    /// volumes, which makes debugging a live system much easier. It is
    /// deterministic so a re-entered start or finalise finds the same
    /// objects.
    pub fn slug(&self) -> String {
        slugify(&format!("{}-{}-{}", self.workspace, self.action, self.id))
    }

    pub fn container_name(&self) -> String {
        format!("job-{}", self.slug())
    }

    pub fn volume_name(&self) -> String {
        format!("volume-{}", self.slug())
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            id: JobId = JobId::from_string("testjob0000000id"),
            job_request_id: String = "request-1",
            workspace: String = "testspace",
            repo_url: String = "https://example.com/repo.git",
            action: String = "do_thing",
        }
        set {
            requires_outputs_from: Vec<String> = Vec::new(),
            wait_for_job_ids: Vec<JobId> = Vec::new(),
            output_spec: OutputSpec = OutputSpec::new(),
            status: State = State::Pending,
            created_at: i64 = 1_600_000_000,
        }
        option {
            commit: String = Some("abc123".to_string()),
            database_name: String = Some("default".to_string()),
            run_command: String = Some("runner:v1 analyse".to_string()),
            status_message: String = None,
            updated_at: i64 = None,
            started_at: i64 = None,
            completed_at: i64 = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
