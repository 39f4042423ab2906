// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row codecs and queries for the `job` table.

use crate::error::StoreError;
use crate::filter::{where_clause, Filter, JobField};
use crank_core::{Job, JobId, OutputSpec, State};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

const COLUMNS: &str = "id, job_request_id, workspace, repo_url, commit_sha, database_name, \
                       action, run_command, requires_outputs_from, wait_for_job_ids, \
                       output_spec, status, status_message, created_at, updated_at, \
                       started_at, completed_at";

pub(crate) fn insert(conn: &Connection, job: &Job) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT INTO job ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );
    conn.execute(&sql, params_from_iter(encode(job)?))?;
    Ok(())
}

pub(crate) fn update(conn: &Connection, job: &Job, fields: &[JobField]) -> Result<(), StoreError> {
    debug_assert!(!fields.is_empty());
    let assignments =
        fields.iter().map(|f| format!("{} = ?", f.column())).collect::<Vec<_>>().join(", ");
    let sql = format!("UPDATE job SET {assignments} WHERE id = ?");
    let mut values: Vec<Value> = fields.iter().map(|f| f.value(job)).collect();
    values.push(Value::Text(job.id.to_string()));
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

pub(crate) fn find_where(conn: &Connection, filters: &[Filter]) -> Result<Vec<Job>, StoreError> {
    let (clause, values) = where_clause(filters);
    let sql = format!("SELECT {COLUMNS} FROM job WHERE {clause} ORDER BY created_at, id");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(values))?;
    let mut jobs = Vec::new();
    while let Some(row) = rows.next()? {
        jobs.push(decode(row)?);
    }
    Ok(jobs)
}

pub(crate) fn exists_where(conn: &Connection, filters: &[Filter]) -> Result<bool, StoreError> {
    let (clause, values) = where_clause(filters);
    let sql = format!("SELECT EXISTS (SELECT 1 FROM job WHERE {clause})");
    let exists: bool = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
    Ok(exists)
}

pub(crate) fn count_where(conn: &Connection, filters: &[Filter]) -> Result<u64, StoreError> {
    let (clause, values) = where_clause(filters);
    let sql = format!("SELECT COUNT(*) FROM job WHERE {clause}");
    let count: u64 = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
    Ok(count)
}

pub(crate) fn select_statuses(conn: &Connection, ids: &[JobId]) -> Result<Vec<State>, StoreError> {
    let (clause, values) = where_clause(&[Filter::IdIn(ids.to_vec())]);
    let sql = format!("SELECT status FROM job WHERE {clause}");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(values))?;
    let mut statuses = Vec::new();
    while let Some(row) = rows.next()? {
        let tag: String = row.get(0)?;
        statuses.push(decode_status(&tag)?);
    }
    Ok(statuses)
}

fn encode(job: &Job) -> Result<Vec<Value>, StoreError> {
    fn opt_text(value: &Option<String>) -> Value {
        value.as_ref().map(|s| Value::Text(s.clone())).unwrap_or(Value::Null)
    }
    fn opt_int(value: Option<i64>) -> Value {
        value.map(Value::Integer).unwrap_or(Value::Null)
    }
    Ok(vec![
        Value::Text(job.id.to_string()),
        Value::Text(job.job_request_id.clone()),
        Value::Text(job.workspace.clone()),
        Value::Text(job.repo_url.clone()),
        opt_text(&job.commit),
        opt_text(&job.database_name),
        Value::Text(job.action.clone()),
        opt_text(&job.run_command),
        Value::Text(serde_json::to_string(&job.requires_outputs_from)?),
        Value::Text(serde_json::to_string(&job.wait_for_job_ids)?),
        Value::Text(serde_json::to_string(&job.output_spec)?),
        Value::Text(job.status.tag().to_string()),
        opt_text(&job.status_message),
        Value::Integer(job.created_at),
        opt_int(job.updated_at),
        opt_int(job.started_at),
        opt_int(job.completed_at),
    ])
}

fn decode(row: &Row<'_>) -> Result<Job, StoreError> {
    let id: String = row.get(0)?;
    let requires_outputs_from: String = row.get(8)?;
    let wait_for_job_ids: String = row.get(9)?;
    let output_spec: String = row.get(10)?;
    let status: String = row.get(11)?;
    Ok(Job {
        id: JobId::from_string(id),
        job_request_id: row.get(1)?,
        workspace: row.get(2)?,
        repo_url: row.get(3)?,
        commit: row.get(4)?,
        database_name: row.get(5)?,
        action: row.get(6)?,
        run_command: row.get(7)?,
        requires_outputs_from: serde_json::from_str(&requires_outputs_from)?,
        wait_for_job_ids: serde_json::from_str::<Vec<String>>(&wait_for_job_ids)?
            .into_iter()
            .map(JobId::from_string)
            .collect(),
        output_spec: serde_json::from_str::<OutputSpec>(&output_spec)?,
        status: decode_status(&status)?,
        status_message: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        started_at: row.get(15)?,
        completed_at: row.get(16)?,
    })
}

fn decode_status(tag: &str) -> Result<State, StoreError> {
    State::from_tag(tag).ok_or_else(|| StoreError::BadStatusTag(tag.to_string()))
}
