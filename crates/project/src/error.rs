// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project validation errors.

use thiserror::Error;

/// A problem with a project file or a reference into it.
///
/// These surface to the coordinator as the message of a failed synthetic
/// job, so every variant reads as a sentence aimed at the study author.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Could not parse project.yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Could not read project file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Project file must specify a version")]
    MissingVersion,
    #[error("Project file does not define any actions")]
    NoActions,
    #[error("Action '{0}' not found in project.yaml")]
    UnknownAction(String),
    #[error("Action '{action}' has an invalid run command: {reason}")]
    InvalidRunCommand { action: String, reason: String },
    #[error("Action '{0}' does not declare any outputs")]
    NoOutputs(String),
    #[error("Action '{action}' has an invalid output pattern '{pattern}': {reason}")]
    InvalidOutputPattern { action: String, pattern: String, reason: String },
    #[error("Action '{action}' lists '{pattern}' under more than one privacy level")]
    DuplicateOutputPattern { action: String, pattern: String },
    #[error("Action '{action}' needs '{needed}' which is not defined in the project")]
    UnknownDependency { action: String, needed: String },
    #[error("Dependency cycle detected involving action '{0}'")]
    DependencyCycle(String),
}
