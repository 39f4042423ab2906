// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed query filters and updatable-field tags for the job table.

use crank_core::{Job, JobId, State};
use rusqlite::types::Value;

/// A single predicate over job rows. Multiple filters AND together.
#[derive(Debug, Clone)]
pub enum Filter {
    Workspace(String),
    Action(String),
    JobRequestId(String),
    Status(State),
    StatusIn(Vec<State>),
    IdIn(Vec<JobId>),
    JobRequestIdIn(Vec<String>),
}

impl Filter {
    fn clause(&self) -> String {
        match self {
            Filter::Workspace(_) => "workspace = ?".to_string(),
            Filter::Action(_) => "action = ?".to_string(),
            Filter::JobRequestId(_) => "job_request_id = ?".to_string(),
            Filter::Status(_) => "status = ?".to_string(),
            Filter::StatusIn(states) => in_clause("status", states.len()),
            Filter::IdIn(ids) => in_clause("id", ids.len()),
            Filter::JobRequestIdIn(ids) => in_clause("job_request_id", ids.len()),
        }
    }

    fn values(&self) -> Vec<Value> {
        match self {
            Filter::Workspace(s) | Filter::Action(s) | Filter::JobRequestId(s) => {
                vec![Value::Text(s.clone())]
            }
            Filter::Status(state) => vec![Value::Text(state.tag().to_string())],
            Filter::StatusIn(states) => {
                states.iter().map(|s| Value::Text(s.tag().to_string())).collect()
            }
            Filter::IdIn(ids) => ids.iter().map(|id| Value::Text(id.to_string())).collect(),
            Filter::JobRequestIdIn(ids) => ids.iter().map(|id| Value::Text(id.clone())).collect(),
        }
    }
}

fn in_clause(column: &str, len: usize) -> String {
    // An empty IN () is a syntax error in SQLite; match nothing instead.
    if len == 0 {
        return "1 = 0".to_string();
    }
    let placeholders = vec!["?"; len].join(", ");
    format!("{column} IN ({placeholders})")
}

/// Combine filters into a WHERE clause and its bound values.
pub(crate) fn where_clause(filters: &[Filter]) -> (String, Vec<Value>) {
    if filters.is_empty() {
        return ("1 = 1".to_string(), Vec::new());
    }
    let clause = filters.iter().map(Filter::clause).collect::<Vec<_>>().join(" AND ");
    let values = filters.iter().flat_map(|f| f.values()).collect();
    (clause, values)
}

/// Tags for the job fields the run loop is allowed to write back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobField {
    Status,
    StatusMessage,
    UpdatedAt,
    StartedAt,
    CompletedAt,
}

impl JobField {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            JobField::Status => "status",
            JobField::StatusMessage => "status_message",
            JobField::UpdatedAt => "updated_at",
            JobField::StartedAt => "started_at",
            JobField::CompletedAt => "completed_at",
        }
    }

    pub(crate) fn value(&self, job: &Job) -> Value {
        fn opt_text(value: &Option<String>) -> Value {
            value.as_ref().map(|s| Value::Text(s.clone())).unwrap_or(Value::Null)
        }
        fn opt_int(value: Option<i64>) -> Value {
            value.map(Value::Integer).unwrap_or(Value::Null)
        }
        match self {
            JobField::Status => Value::Text(job.status.tag().to_string()),
            JobField::StatusMessage => opt_text(&job.status_message),
            JobField::UpdatedAt => opt_int(job.updated_at),
            JobField::StartedAt => opt_int(job.started_at),
            JobField::CompletedAt => opt_int(job.completed_at),
        }
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
