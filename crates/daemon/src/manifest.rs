// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-workspace manifest: which action created each file, and each
//! action's last run.
//!
//! Lives at `metadata/manifest.json` inside the high-privacy workspace (and
//! is mirrored into the medium-privacy workspace). The manifest is the
//! expander's source of truth for "has this action already run
//! successfully", so it is only ever replaced atomically and only after all
//! output files for a run are on disk.

use crank_core::{PrivacyLevel, State};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Directory inside a workspace where the manifest and logs live.
pub const METADATA_DIR: &str = "metadata";

/// Manifest filename within [`METADATA_DIR`].
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("could not read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not decode manifest: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Why an action's historical outputs cannot be used as-is.
#[derive(Debug, Error)]
pub enum OutputsError {
    #[error("{0} has not been run")]
    ActionNotRun(String),
    #[error("{0} failed")]
    ActionFailed(String),
    #[error("Output {file} missing from {action}")]
    MissingOutput { action: String, file: String },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub created_by_action: String,
    pub privacy_level: PrivacyLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub status: State,
    pub commit: Option<String>,
    pub docker_image_id: Option<String>,
    pub job_id: String,
    pub run_by_user: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// The manifest document.
///
/// `files` is keyed by workspace-relative path; a BTreeMap keeps it
/// lexicographically sorted. `actions` preserves insertion order so
/// consumers see actions in the order they ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub files: BTreeMap<String, FileEntry>,
    pub actions: IndexMap<String, ActionEntry>,
}

impl Manifest {
    /// Replace this action's contribution: drop its previous `files`
    /// entries, add the new ones, and move the action's entry to the end of
    /// `actions` so ordering reflects execution order.
    pub fn record_run(
        &mut self,
        action: &str,
        outputs: &BTreeMap<String, PrivacyLevel>,
        entry: ActionEntry,
    ) {
        self.files.retain(|_, details| details.created_by_action != action);
        for (filename, privacy_level) in outputs {
            self.files.insert(
                filename.clone(),
                FileEntry { created_by_action: action.to_string(), privacy_level: *privacy_level },
            );
        }
        self.actions.shift_remove(action);
        self.actions.insert(action.to_string(), entry);
    }

    /// The files this manifest attributes to an action.
    pub fn files_created_by(&self, action: &str) -> Vec<String> {
        self.files
            .iter()
            .filter(|(_, details)| details.created_by_action == action)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Read the manifest of a workspace, returning an empty manifest if none has
/// been written yet.
pub fn read_manifest(workspace_dir: &Path) -> Result<Manifest, ManifestError> {
    let path = workspace_dir.join(METADATA_DIR).join(MANIFEST_FILE);
    match std::fs::read(&path) {
        Ok(content) => Ok(serde_json::from_slice(&content)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::default()),
        Err(err) => Err(err.into()),
    }
}

/// Atomically replace the manifest: write a `.tmp` sibling, then rename.
pub fn write_manifest(workspace_dir: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
    let dir = workspace_dir.join(METADATA_DIR);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(MANIFEST_FILE);
    let tmp_path = dir.join(format!("{MANIFEST_FILE}.tmp"));
    std::fs::write(&tmp_path, serde_json::to_vec_pretty(manifest)?)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// List the on-disk outputs the manifest attributes to an action.
///
/// With `ignore_errors` false this also verifies the action ran and
/// completed and that every listed file is still present.
pub fn list_outputs_from_action(
    workspace_dir: &Path,
    action: &str,
    ignore_errors: bool,
) -> Result<Vec<String>, OutputsError> {
    let manifest = read_manifest(workspace_dir)?;
    let status = manifest.actions.get(action).map(|entry| entry.status);
    if !ignore_errors {
        match status {
            None => return Err(OutputsError::ActionNotRun(action.to_string())),
            Some(State::Completed) => {}
            Some(_) => return Err(OutputsError::ActionFailed(action.to_string())),
        }
    }
    let files = manifest.files_created_by(action);
    if !ignore_errors {
        for filename in &files {
            // Only possible if files were manually deleted from disk
            if !workspace_dir.join(filename).exists() {
                return Err(OutputsError::MissingOutput {
                    action: action.to_string(),
                    file: filename.clone(),
                });
            }
        }
    }
    Ok(files)
}

/// Three-way answer for the expander:
/// - `Some(true)`: the action completed and all its outputs are on disk
/// - `Some(false)`: the action ran and failed
/// - `None`: never run, or outputs have since gone missing
pub fn action_has_successful_outputs(workspace_dir: &Path, action: &str) -> Option<bool> {
    match list_outputs_from_action(workspace_dir, action, false) {
        Ok(_) => Some(true),
        Err(OutputsError::ActionFailed(_)) => Some(false),
        Err(_) => None,
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
