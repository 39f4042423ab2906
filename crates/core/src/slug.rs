// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slugify strings for use in container and volume names.

/// Maximum slug length. Container names get a short prefix on top of the
/// slug, so stay comfortably inside Docker's hostname-length limits.
const MAX_SLUG_LEN: usize = 63;

/// Slugify a string for use as a Docker object name component.
///
/// Lowercases, replaces any run of non-alphanumeric characters with a single
/// hyphen, trims leading/trailing hyphens, and truncates to a safe length.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_was_hyphen = true; // suppress leading hyphens
    for ch in input.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
#[path = "slug_tests.rs"]
mod tests;
