// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier generation.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Alphabet for generated job IDs. Lowercase so the ID survives slugification
/// unchanged when embedded in container and volume names.
const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Number of random characters in a generated job ID.
const ID_LEN: usize = 16;

/// Opaque, URL-safe identifier for a [`crate::Job`].
///
/// Inline-allocated so it is cheap to clone and to use as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(SmolStr);

impl JobId {
    /// Generate a new random ID.
    pub fn new() -> Self {
        Self(SmolStr::new(nanoid::nanoid!(ID_LEN, &ID_ALPHABET)))
    }

    /// Create an ID from an existing string (for decoding persisted rows).
    pub fn from_string(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq<str> for JobId {
    fn eq(&self, other: &str) -> bool {
        self.0.as_str() == other
    }
}

impl PartialEq<&str> for JobId {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_str() == *other
    }
}

impl std::borrow::Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
