// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crank-store: the durable job and job-request tables.
//!
//! A single-writer SQLite store. Composite fields (id lists, the output
//! spec, the original request payload) are stored as JSON text; the status
//! enum is stored as its tag value. Exactly one process writes; readers only
//! ever observe committed state.

pub mod error;
pub mod filter;
mod jobs;
mod requests;

use crank_core::{Job, JobId, SavedJobRequest, State};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

pub use error::StoreError;
pub use filter::{Filter, JobField};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS job (
    id TEXT PRIMARY KEY,
    job_request_id TEXT NOT NULL,
    workspace TEXT NOT NULL,
    repo_url TEXT NOT NULL,
    commit_sha TEXT,
    database_name TEXT,
    action TEXT NOT NULL,
    run_command TEXT,
    requires_outputs_from TEXT NOT NULL,
    wait_for_job_ids TEXT NOT NULL,
    output_spec TEXT NOT NULL,
    status TEXT NOT NULL,
    status_message TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER,
    started_at INTEGER,
    completed_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_job_status ON job (status);
CREATE INDEX IF NOT EXISTS idx_job_request ON job (job_request_id);
CREATE TABLE IF NOT EXISTS job_request (
    id TEXT PRIMARY KEY,
    original TEXT NOT NULL
);
";

/// Handle on the store. Cheap to share behind an `Arc`; all access is
/// serialised through an internal lock.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if necessary) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// An in-memory store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Run `f` inside a transaction: either every write commits or none do.
    ///
    /// The closure's error type only needs a `From<StoreError>` conversion,
    /// so callers can abort a transaction with their own error kinds.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Tx<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN").map_err(StoreError::from)?;
        match f(&Tx { conn: &conn }) {
            Ok(value) => {
                conn.execute_batch("COMMIT").map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    }

    pub fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        jobs::insert(&self.conn.lock(), job)
    }

    /// Write the named fields of `job` back to its row.
    pub fn update_job(&self, job: &Job, fields: &[JobField]) -> Result<(), StoreError> {
        jobs::update(&self.conn.lock(), job, fields)
    }

    pub fn find_jobs_where(&self, filters: &[Filter]) -> Result<Vec<Job>, StoreError> {
        jobs::find_where(&self.conn.lock(), filters)
    }

    pub fn exists_job_where(&self, filters: &[Filter]) -> Result<bool, StoreError> {
        jobs::exists_where(&self.conn.lock(), filters)
    }

    pub fn count_jobs_where(&self, filters: &[Filter]) -> Result<u64, StoreError> {
        jobs::count_where(&self.conn.lock(), filters)
    }

    /// The status column of each of the given jobs, in arbitrary order.
    pub fn select_statuses(&self, ids: &[JobId]) -> Result<Vec<State>, StoreError> {
        jobs::select_statuses(&self.conn.lock(), ids)
    }

    pub fn insert_request(&self, request: &SavedJobRequest) -> Result<(), StoreError> {
        requests::insert(&self.conn.lock(), request)
    }

    pub fn find_request(&self, id: &str) -> Result<Option<SavedJobRequest>, StoreError> {
        requests::find(&self.conn.lock(), id)
    }
}

/// Scoped view of the store inside a [`Store::transaction`] closure.
pub struct Tx<'a> {
    conn: &'a Connection,
}

impl Tx<'_> {
    pub fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        jobs::insert(self.conn, job)
    }

    pub fn find_jobs_where(&self, filters: &[Filter]) -> Result<Vec<Job>, StoreError> {
        jobs::find_where(self.conn, filters)
    }

    pub fn exists_job_where(&self, filters: &[Filter]) -> Result<bool, StoreError> {
        jobs::exists_where(self.conn, filters)
    }

    pub fn insert_request(&self, request: &SavedJobRequest) -> Result<(), StoreError> {
        requests::insert(self.conn, request)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
