// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::ProjectError;

const PROJECT: &str = r#"
version: "1.0"
actions:
  generate_cohort:
    run: cohortextractor:latest generate_cohort
    outputs:
      highly_sensitive:
        cohort: output/input.csv
  analyse:
    run: stata-mp:16 analysis.do
    needs: [generate_cohort]
    outputs:
      moderately_sensitive:
        figure: figures/*.png
"#;

#[test]
fn parses_a_valid_project() {
    let project = parse_and_validate(PROJECT.as_bytes()).unwrap();
    assert_eq!(project.version, "1.0");
    assert_eq!(project.actions.len(), 2);

    let spec = project.action_spec("analyse").unwrap();
    assert_eq!(spec.run, "stata-mp:16 analysis.do");
    assert_eq!(spec.needs, vec!["generate_cohort"]);
    assert_eq!(
        spec.outputs[&crank_core::PrivacyLevel::ModeratelySensitive]["figure"],
        "figures/*.png"
    );
}

#[test]
fn accepts_a_bare_float_version() {
    let yaml = PROJECT.replace("version: \"1.0\"", "version: 1.0");
    let project = parse_and_validate(yaml.as_bytes()).unwrap();
    assert!(!project.version.is_empty());
}

#[test]
fn rejects_missing_version() {
    let yaml = PROJECT.replace("version: \"1.0\"", "");
    let err = parse_and_validate(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::MissingVersion));
}

#[test]
fn rejects_empty_actions() {
    let err = parse_and_validate(b"version: \"1.0\"\nactions: {}\n").unwrap_err();
    assert!(matches!(err, ProjectError::NoActions));
}

#[test]
fn rejects_versionless_run_command() {
    let yaml = PROJECT.replace("stata-mp:16 analysis.do", "stata-mp analysis.do");
    let err = parse_and_validate(yaml.as_bytes()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("must have a version specified"), "got: {message}");
}

#[test]
fn rejects_unknown_dependency() {
    let yaml = PROJECT.replace("[generate_cohort]", "[nonexistent]");
    let err = parse_and_validate(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::UnknownDependency { .. }));
}

#[test]
fn rejects_unknown_privacy_level() {
    let yaml = PROJECT.replace("moderately_sensitive", "public");
    assert!(matches!(parse_and_validate(yaml.as_bytes()), Err(ProjectError::Parse(_))));
}

#[test]
fn rejects_missing_outputs() {
    let yaml = r#"
version: "1.0"
actions:
  a:
    run: runner:v1
    outputs: {}
"#;
    let err = parse_and_validate(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::NoOutputs(action) if action == "a"));
}

#[test]
fn rejects_escaping_output_paths() {
    for bad in ["/etc/passwd", "../sibling/file.csv", "out/../../file.csv", r"out\file.csv"] {
        let yaml = PROJECT.replace("output/input.csv", bad);
        let err = parse_and_validate(yaml.as_bytes()).unwrap_err();
        assert!(
            matches!(err, ProjectError::InvalidOutputPattern { .. }),
            "expected pattern error for {bad}, got {err}"
        );
    }
}

#[test]
fn rejects_same_pattern_under_two_privacy_levels() {
    let yaml = r#"
version: "1.0"
actions:
  a:
    run: runner:v1
    outputs:
      highly_sensitive:
        data: out/data.csv
      moderately_sensitive:
        data_again: out/data.csv
"#;
    let err = parse_and_validate(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::DuplicateOutputPattern { .. }));
}

#[test]
fn rejects_dependency_cycles() {
    let yaml = r#"
version: "1.0"
actions:
  a:
    run: runner:v1
    needs: [b]
    outputs:
      highly_sensitive:
        out: a.csv
  b:
    run: runner:v1
    needs: [a]
    outputs:
      highly_sensitive:
        out: b.csv
"#;
    let err = parse_and_validate(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::DependencyCycle(_)));
}

#[test]
fn self_dependency_is_a_cycle() {
    let yaml = r#"
version: "1.0"
actions:
  a:
    run: runner:v1
    needs: [a]
    outputs:
      highly_sensitive:
        out: a.csv
"#;
    let err = parse_and_validate(yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ProjectError::DependencyCycle(name) if name == "a"));
}

#[test]
fn unknown_action_lookup_fails() {
    let project = parse_and_validate(PROJECT.as_bytes()).unwrap();
    let err = project.action_spec("missing").unwrap_err();
    assert_eq!(err.to_string(), "Action 'missing' not found in project.yaml");
}

#[test]
fn all_output_patterns_reads_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.yaml");
    std::fs::write(&path, PROJECT).unwrap();

    let mut patterns = all_output_patterns_from_file(&path).unwrap();
    patterns.sort();
    assert_eq!(patterns, vec!["figures/*.png", "output/input.csv"]);
}

#[test]
fn missing_project_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = all_output_patterns_from_file(&dir.path().join("project.yaml")).unwrap_err();
    assert!(matches!(err, ProjectError::Read(_)));
}
