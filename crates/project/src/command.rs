// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-command splitting and classification.
//!
//! A `run` command is a single line of the form `image:version arg…`. It is
//! stored verbatim on the job and only split into argv when the container is
//! started, so splitting has to be deterministic and quote-aware.

/// Split a run command into words.
///
/// Whitespace separates words; single quotes preserve everything literally;
/// double quotes preserve everything except `\"` and `\\` escapes; a
/// backslash outside quotes escapes the next character.
pub fn split_command(command: &str) -> Result<Vec<String>, String> {
    #[derive(PartialEq)]
    enum Mode {
        Plain,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut mode = Mode::Plain;
    let mut chars = command.chars();

    while let Some(ch) = chars.next() {
        match mode {
            Mode::Plain => match ch {
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                '\'' => {
                    mode = Mode::Single;
                    in_word = true;
                }
                '"' => {
                    mode = Mode::Double;
                    in_word = true;
                }
                '\\' => {
                    let next = chars.next().ok_or("trailing backslash")?;
                    current.push(next);
                    in_word = true;
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
            Mode::Single => match ch {
                '\'' => mode = Mode::Plain,
                c => current.push(c),
            },
            Mode::Double => match ch {
                '"' => mode = Mode::Plain,
                '\\' => {
                    let next = chars.next().ok_or("unterminated double quote")?;
                    if next != '"' && next != '\\' {
                        current.push('\\');
                    }
                    current.push(next);
                }
                c => current.push(c),
            },
        }
    }

    if mode != Mode::Plain {
        return Err("unterminated quote".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Is this the privileged cohort-extraction command?
///
/// Only this command receives database credentials and network access when
/// its container is started, so the image name (before the version tag) must
/// match exactly.
pub fn is_generate_cohort_command(args: &[String]) -> bool {
    let Some(first) = args.first() else {
        return false;
    };
    let image = first.split_once(':').map(|(name, _)| name).unwrap_or(first.as_str());
    image == "cohortextractor" && args[1..].iter().any(|arg| arg == "generate_cohort")
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
