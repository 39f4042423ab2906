// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row codecs and queries for the `job_request` table.

use crate::error::StoreError;
use crank_core::SavedJobRequest;
use rusqlite::{Connection, OptionalExtension};

pub(crate) fn insert(conn: &Connection, request: &SavedJobRequest) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO job_request (id, original) VALUES (?, ?)",
        (&request.id, serde_json::to_string(&request.original)?),
    )?;
    Ok(())
}

pub(crate) fn find(conn: &Connection, id: &str) -> Result<Option<SavedJobRequest>, StoreError> {
    let row: Option<(String, String)> = conn
        .query_row("SELECT id, original FROM job_request WHERE id = ?", [id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()?;
    match row {
        Some((id, original)) => {
            Ok(Some(SavedJobRequest { id, original: serde_json::from_str(&original)? }))
        }
        None => Ok(None),
    }
}
