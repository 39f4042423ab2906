// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job requests as received from the coordinator.

use serde::{Deserialize, Serialize};

/// A coordinator-issued instruction to run one or more actions in a
/// workspace at a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: String,
    pub repo_url: String,
    /// Commit sha; resolved from `branch` by the expander when absent.
    pub commit: Option<String>,
    pub branch: String,
    pub workspace: String,
    pub database_name: String,
    pub requested_actions: Vec<String>,
    pub force_run_dependencies: bool,
    /// The payload exactly as received, embedded verbatim in each job's
    /// on-disk metadata.
    pub original: serde_json::Value,
}

impl JobRequest {
    /// The `created_by` field of the original payload, if the coordinator
    /// supplied one.
    pub fn created_by(&self) -> Option<&str> {
        self.original.get("created_by").and_then(|v| v.as_str())
    }
}

/// The persisted copy of a request: written once when the request is first
/// seen, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedJobRequest {
    pub id: String,
    pub original: serde_json::Value,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
