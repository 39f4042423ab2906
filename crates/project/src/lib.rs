// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crank-project: the `project.yaml` model.
//!
//! Parses a project manifest once per request expansion, validates it (run
//! commands, output patterns, dependency graph), and resolves per-action
//! specifications for the expander and the job manager.

pub mod command;
pub mod error;
pub mod model;

pub use command::{is_generate_cohort_command, split_command};
pub use error::ProjectError;
pub use model::{
    all_output_patterns_from_file, parse_and_validate, ActionDef, ActionSpec, Project,
};
