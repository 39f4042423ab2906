// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manifest round-trip and pruning specs.

use crank_core::{PrivacyLevel, State};
use crank_daemon::manifest::{
    action_has_successful_outputs, read_manifest, write_manifest, ActionEntry, Manifest,
};
use std::collections::BTreeMap;

fn entry(status: State, job_id: &str) -> ActionEntry {
    ActionEntry {
        status,
        commit: Some("abc123".to_string()),
        docker_image_id: Some("sha256:cafe".to_string()),
        job_id: job_id.to_string(),
        run_by_user: Some("researcher".to_string()),
        created_at: 100,
        completed_at: Some(200),
    }
}

#[test]
fn manifest_disk_round_trip_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = Manifest::default();
    manifest.record_run(
        "generate_cohort",
        &BTreeMap::from([(
            "output/input.csv".to_string(),
            PrivacyLevel::HighlySensitive,
        )]),
        entry(State::Completed, "job-1"),
    );
    manifest.record_run(
        "analyse",
        &BTreeMap::from([
            ("figures/a.png".to_string(), PrivacyLevel::ModeratelySensitive),
            ("figures/b.png".to_string(), PrivacyLevel::ModeratelySensitive),
        ]),
        entry(State::Completed, "job-2"),
    );

    write_manifest(dir.path(), &manifest).unwrap();
    let read_back = read_manifest(dir.path()).unwrap();
    assert_eq!(read_back, manifest);

    write_manifest(dir.path(), &read_back).unwrap();
    assert_eq!(read_manifest(dir.path()).unwrap(), manifest);
}

#[test]
fn manifest_file_layout_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = Manifest::default();
    manifest.record_run(
        "analyse",
        &BTreeMap::from([("figures/a.png".to_string(), PrivacyLevel::ModeratelySensitive)]),
        entry(State::Completed, "job-2"),
    );
    write_manifest(dir.path(), &manifest).unwrap();

    let raw: serde_json::Value = serde_json::from_slice(
        &std::fs::read(dir.path().join("metadata").join("manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(raw["files"]["figures/a.png"]["created_by_action"], "analyse");
    assert_eq!(raw["files"]["figures/a.png"]["privacy_level"], "moderately_sensitive");
    assert_eq!(raw["actions"]["analyse"]["status"], "completed");
    assert_eq!(raw["actions"]["analyse"]["job_id"], "job-2");
}

#[test]
fn a_rerun_fully_replaces_the_previous_output_set() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("output")).unwrap();
    std::fs::write(dir.path().join("output/new.csv"), "x").unwrap();

    let mut manifest = Manifest::default();
    manifest.record_run(
        "generate_cohort",
        &BTreeMap::from([("output/old.csv".to_string(), PrivacyLevel::HighlySensitive)]),
        entry(State::Completed, "job-1"),
    );
    manifest.record_run(
        "generate_cohort",
        &BTreeMap::from([("output/new.csv".to_string(), PrivacyLevel::HighlySensitive)]),
        entry(State::Completed, "job-3"),
    );
    write_manifest(dir.path(), &manifest).unwrap();

    // The stale entry is gone and the new state is queryable
    let read_back = read_manifest(dir.path()).unwrap();
    assert!(!read_back.files.contains_key("output/old.csv"));
    assert_eq!(read_back.files_created_by("generate_cohort"), vec!["output/new.csv"]);
    assert_eq!(action_has_successful_outputs(dir.path(), "generate_cohort"), Some(true));
}
