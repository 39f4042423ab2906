// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("could not create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not decode stored row: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unknown status tag '{0}' in database")]
    BadStatusTag(String),
}
