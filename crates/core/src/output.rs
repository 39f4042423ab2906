// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output privacy levels and the per-action output specification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where an output file is allowed to live once extracted.
///
/// Closed set: `highly_sensitive` outputs stay in the primary workspace,
/// `moderately_sensitive` outputs are additionally mirrored to the
/// medium-privacy workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    HighlySensitive,
    ModeratelySensitive,
}

crate::simple_display! {
    PrivacyLevel {
        HighlySensitive => "highly_sensitive",
        ModeratelySensitive => "moderately_sensitive",
    }
}

/// Declared outputs of an action: privacy level → output name → glob pattern.
pub type OutputSpec = BTreeMap<PrivacyLevel, BTreeMap<String, String>>;

/// Flatten an output spec to the full list of glob patterns, in privacy-level
/// then name order.
pub fn all_patterns(spec: &OutputSpec) -> Vec<String> {
    spec.values().flat_map(|named| named.values().cloned()).collect()
}

/// The glob patterns declared under a single privacy level.
pub fn patterns_for_level(spec: &OutputSpec, level: PrivacyLevel) -> Vec<String> {
    spec.get(&level).map(|named| named.values().cloned().collect()).unwrap_or_default()
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
