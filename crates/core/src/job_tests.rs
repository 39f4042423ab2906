// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn state_tags_round_trip() {
    for state in [State::Pending, State::Running, State::Completed, State::Failed] {
        assert_eq!(State::from_tag(state.tag()), Some(state));
    }
    assert_eq!(State::from_tag("bogus"), None);
}

#[test]
fn state_serde_uses_lowercase_tags() {
    assert_eq!(serde_json::to_string(&State::Pending).unwrap(), "\"pending\"");
    let parsed: State = serde_json::from_str("\"failed\"").unwrap();
    assert_eq!(parsed, State::Failed);
}

#[test]
fn terminal_states() {
    assert!(!State::Pending.is_terminal());
    assert!(!State::Running.is_terminal());
    assert!(State::Completed.is_terminal());
    assert!(State::Failed.is_terminal());
}

#[test]
fn slug_combines_workspace_action_and_id() {
    let job = Job::builder().workspace("tpp-study").action("run_model").build();
    assert_eq!(job.slug(), "tpp-study-run-model-testjob0000000id");
}

#[test]
fn container_and_volume_names_share_the_slug() {
    let job = Job::builder().build();
    assert_eq!(job.container_name(), format!("job-{}", job.slug()));
    assert_eq!(job.volume_name(), format!("volume-{}", job.slug()));
}

#[test]
fn slug_is_deterministic() {
    let a = Job::builder().build();
    let b = Job::builder().build();
    assert_eq!(a.slug(), b.slug());
}

#[test]
fn job_serde_round_trips() {
    let mut output_spec = OutputSpec::new();
    output_spec.insert(
        crate::PrivacyLevel::HighlySensitive,
        [("cohort".to_string(), "output/input.csv".to_string())].into_iter().collect(),
    );
    let job = Job::builder()
        .wait_for_job_ids(vec![JobId::from_string("dep0000000000001")])
        .requires_outputs_from(vec!["generate_cohort".to_string()])
        .output_spec(output_spec)
        .status_message("Started")
        .build();
    let json = serde_json::to_string(&job).unwrap();
    let parsed: Job = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, job);
}
