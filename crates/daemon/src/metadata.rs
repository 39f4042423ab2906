// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job metadata blob written alongside each run's logs, and the
//! redaction applied to container metadata before anything is persisted.

use crank_core::{Job, PrivacyLevel, SavedJobRequest, State};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Environment variables whose values do not need to be hidden in persisted
/// metadata. At present the only sensitive value is DATABASE_URL, but an
/// explicit safelist is safer than a blocklist; license keys and the like
/// may end up in the environment later.
pub const SAFE_ENVIRONMENT_VARIABLES: &[&str] = &[
    "PATH",
    "PYTHON_VERSION",
    "DEBIAN_FRONTEND",
    "DEBCONF_NONINTERACTIVE_SEEN",
    "UBUNTU_VERSION",
    "PYENV_SHELL",
    "PYENV_VERSION",
    "PYTHONUNBUFFERED",
];

const REDACTED: &str = "xxxx-REDACTED-xxxx";

/// Redact the values of any environment variables in the container metadata
/// which aren't on the explicit safelist.
pub fn redact_environment_variables(container_metadata: &mut Value) {
    let Some(env) = container_metadata
        .get_mut("Config")
        .and_then(|config| config.get_mut("Env"))
        .and_then(Value::as_array_mut)
    else {
        return;
    };
    for entry in env {
        let Some(line) = entry.as_str() else { continue };
        let Some((key, _)) = line.split_once('=') else { continue };
        if !SAFE_ENVIRONMENT_VARIABLES.contains(&key) {
            *entry = Value::String(format!("{key}={REDACTED}"));
        }
    }
}

/// Everything we know about a finished job, as one JSON-serialisable
/// document.
///
/// `status`, `status_message` and `completed_at` anticipate the final state
/// the run loop will publish once finalisation returns; only the run loop
/// actually transitions the job.
#[allow(clippy::too_many_arguments)]
pub fn build_job_metadata(
    job: &Job,
    request: &SavedJobRequest,
    container_metadata: &Value,
    docker_image_id: Option<&str>,
    outputs: &BTreeMap<String, PrivacyLevel>,
    final_status: State,
    final_status_message: &str,
    completed_at: i64,
) -> Value {
    let mut final_job = job.clone();
    final_job.status = final_status;
    final_job.status_message = Some(final_status_message.to_string());
    // This won't exactly match the completed_at the loop publishes, which is
    // only set once the whole job has finished processing.
    final_job.completed_at = Some(completed_at);

    let mut metadata = match serde_json::to_value(&final_job) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    metadata.insert("job_id".to_string(), json!(job.id.as_str()));
    metadata.insert(
        "run_by_user".to_string(),
        request.original.get("created_by").cloned().unwrap_or(Value::Null),
    );
    metadata.insert("job_request".to_string(), request.original.clone());
    metadata.insert("docker_image_id".to_string(), json!(docker_image_id));
    metadata.insert("outputs".to_string(), json!(outputs));
    metadata.insert("container_metadata".to_string(), container_metadata.clone());
    Value::Object(metadata)
}

/// The trailer appended to a job's `logs.txt` after the container log: a
/// block of `key: value` job fields and a sorted listing of outputs.
pub fn log_file_trailer(job_metadata: &Value) -> String {
    let mut trailer = String::from("\n\n");
    for key in [
        "status",
        "status_message",
        "commit",
        "docker_image_id",
        "job_id",
        "run_by_user",
        "created_at",
        "started_at",
        "completed_at",
    ] {
        let value = job_metadata.get(key).unwrap_or(&Value::Null);
        trailer.push_str(&format!("{key}: {}\n", display_value(value)));
    }
    trailer.push_str("\noutputs:\n");
    let mut outputs: Vec<(String, String)> = job_metadata
        .get("outputs")
        .and_then(Value::as_object)
        .map(|outputs| {
            outputs
                .iter()
                .map(|(name, level)| (display_value(level), name.clone()))
                .collect()
        })
        .unwrap_or_default();
    outputs.sort();
    for (privacy_level, name) in outputs {
        trailer.push_str(&format!("  {privacy_level} - {name}\n"));
    }
    trailer
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
