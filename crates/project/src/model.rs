// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed model of `project.yaml` with parse-time validation.

use crate::command::split_command;
use crate::error::ProjectError;
use crank_core::{all_patterns, OutputSpec};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// One named step of a project.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionDef {
    /// Command line of the form `image:version arg…`.
    pub run: String,
    /// Actions whose outputs this action consumes.
    #[serde(default)]
    pub needs: Vec<String>,
    /// Declared outputs: privacy level → output name → glob pattern.
    pub outputs: OutputSpec,
}

/// A parsed and validated project file.
#[derive(Debug, Clone)]
pub struct Project {
    pub version: String,
    pub actions: BTreeMap<String, ActionDef>,
}

/// The resolved specification of a single action, as the expander consumes
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    pub run: String,
    pub needs: Vec<String>,
    pub outputs: OutputSpec,
}

/// Raw serde shape of the file, before validation.
#[derive(Debug, Deserialize)]
struct ProjectFile {
    // Accepts `version: "1.0"` and the bare-float spelling `version: 1.0`.
    #[serde(default)]
    version: Option<serde_yaml::Value>,
    #[serde(default)]
    actions: BTreeMap<String, ActionDef>,
}

/// Parse and validate a project file.
pub fn parse_and_validate(content: &[u8]) -> Result<Project, ProjectError> {
    let file: ProjectFile = serde_yaml::from_slice(content)?;

    let version = match file.version {
        Some(serde_yaml::Value::String(s)) if !s.is_empty() => s,
        Some(serde_yaml::Value::Number(n)) => n.to_string(),
        _ => return Err(ProjectError::MissingVersion),
    };
    if file.actions.is_empty() {
        return Err(ProjectError::NoActions);
    }

    for (name, action) in &file.actions {
        validate_run_command(name, &action.run)?;
        validate_outputs(name, &action.outputs)?;
        for needed in &action.needs {
            if !file.actions.contains_key(needed) {
                return Err(ProjectError::UnknownDependency {
                    action: name.clone(),
                    needed: needed.clone(),
                });
            }
        }
    }
    check_for_cycles(&file.actions)?;

    Ok(Project { version, actions: file.actions })
}

impl Project {
    /// Resolve the specification of a named action.
    pub fn action_spec(&self, name: &str) -> Result<ActionSpec, ProjectError> {
        let action =
            self.actions.get(name).ok_or_else(|| ProjectError::UnknownAction(name.to_string()))?;
        Ok(ActionSpec {
            run: action.run.clone(),
            needs: action.needs.clone(),
            outputs: action.outputs.clone(),
        })
    }
}

/// Every output glob across every action of the project file at `path`.
///
/// Local-run mode uses this as an ignore list when populating a volume from
/// the local workspace.
pub fn all_output_patterns_from_file(path: &Path) -> Result<Vec<String>, ProjectError> {
    let content = std::fs::read(path)?;
    let project = parse_and_validate(&content)?;
    Ok(project.actions.values().flat_map(|action| all_patterns(&action.outputs)).collect())
}

fn validate_run_command(action: &str, run: &str) -> Result<(), ProjectError> {
    let invalid = |reason: &str| ProjectError::InvalidRunCommand {
        action: action.to_string(),
        reason: reason.to_string(),
    };
    let args = split_command(run).map_err(|reason| invalid(&reason))?;
    let image = args.first().ok_or_else(|| invalid("command is empty"))?;
    match image.split_once(':') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => Ok(()),
        _ => Err(invalid(&format!("{image} must have a version specified (e.g. {image}:v1)"))),
    }
}

fn validate_outputs(action: &str, outputs: &OutputSpec) -> Result<(), ProjectError> {
    if outputs.values().all(|named| named.is_empty()) {
        return Err(ProjectError::NoOutputs(action.to_string()));
    }
    let mut seen = HashMap::new();
    for (level, named) in outputs {
        for pattern in named.values() {
            if let Some(reason) = invalid_pattern_reason(pattern) {
                return Err(ProjectError::InvalidOutputPattern {
                    action: action.to_string(),
                    pattern: pattern.clone(),
                    reason: reason.to_string(),
                });
            }
            if let Some(previous) = seen.insert(pattern.clone(), level) {
                if previous != level {
                    return Err(ProjectError::DuplicateOutputPattern {
                        action: action.to_string(),
                        pattern: pattern.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn invalid_pattern_reason(pattern: &str) -> Option<&'static str> {
    if pattern.is_empty() {
        Some("pattern is empty")
    } else if pattern.starts_with('/') {
        Some("path must be relative")
    } else if pattern.contains('\\') {
        Some("path must use forward slashes")
    } else if pattern.split('/').any(|segment| segment == "..") {
        Some("path must not contain '..'")
    } else {
        None
    }
}

/// Reject cyclic `needs` graphs so the expander's recursion always
/// terminates.
fn check_for_cycles(actions: &BTreeMap<String, ActionDef>) -> Result<(), ProjectError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }

    fn visit(
        name: &str,
        actions: &BTreeMap<String, ActionDef>,
        marks: &mut HashMap<String, Mark>,
    ) -> Result<(), ProjectError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => return Err(ProjectError::DependencyCycle(name.to_string())),
            None => {}
        }
        marks.insert(name.to_string(), Mark::InProgress);
        if let Some(action) = actions.get(name) {
            for needed in &action.needs {
                visit(needed, actions, marks)?;
            }
        }
        marks.insert(name.to_string(), Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for name in actions.keys() {
        visit(name, actions, &mut marks)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
