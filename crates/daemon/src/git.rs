// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin wrapper over the `git` command-line tool.
//!
//! Repositories are mirrored into a bare cache under the scratch directory,
//! keyed by repo URL, so reading a project file and checking out a commit
//! for volume population don't refetch on every run.

use crate::config::Config;
use crank_core::slugify;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

const GIT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum GitError {
    #[error("i/o failure running git: {0}")]
    Io(#[from] std::io::Error),
    #[error("git {command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("Error resolving ref '{git_ref}' from {repo_url}")]
    RefNotFound { repo_url: String, git_ref: String },
}

/// Resolve a branch or tag name to a commit sha via `git ls-remote`.
pub async fn get_sha_from_remote_ref(repo_url: &str, git_ref: &str) -> Result<String, GitError> {
    let output = run_git(&["ls-remote", "--quiet", repo_url, git_ref]).await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .next()
        .map(str::to_string)
        .ok_or_else(|| GitError::RefNotFound {
            repo_url: repo_url.to_string(),
            git_ref: git_ref.to_string(),
        })
}

/// Read a single file from a repository at a given commit.
pub async fn read_file_from_repo(
    config: &Config,
    repo_url: &str,
    commit: &str,
    path: &str,
) -> Result<Vec<u8>, GitError> {
    let repo_dir = ensure_local_mirror(config, repo_url).await?;
    fetch_commit(&repo_dir, repo_url, commit).await?;
    let git_dir = git_dir_arg(&repo_dir);
    let spec = format!("{commit}:{path}");
    let output = run_git(&[&git_dir, "cat-file", "blob", &spec]).await?;
    Ok(output.stdout)
}

/// Check out the tree of a commit into `target_dir`.
pub async fn checkout_commit(
    config: &Config,
    repo_url: &str,
    commit: &str,
    target_dir: &Path,
) -> Result<(), GitError> {
    let repo_dir = ensure_local_mirror(config, repo_url).await?;
    fetch_commit(&repo_dir, repo_url, commit).await?;
    tokio::fs::create_dir_all(target_dir).await?;
    let git_dir = git_dir_arg(&repo_dir);
    let work_tree = format!("--work-tree={}", target_dir.display());
    run_git(&[&git_dir, &work_tree, "checkout", "--quiet", "--force", commit]).await?;
    Ok(())
}

fn git_dir_arg(repo_dir: &Path) -> String {
    format!("--git-dir={}", repo_dir.display())
}

/// Create (once) the bare repository that mirrors `repo_url`.
async fn ensure_local_mirror(config: &Config, repo_url: &str) -> Result<PathBuf, GitError> {
    let repo_dir = config.scratch_dir().join("git-cache").join(slugify(repo_url));
    if !repo_dir.join("HEAD").exists() {
        tokio::fs::create_dir_all(&repo_dir).await?;
        let dir = repo_dir.display().to_string();
        run_git(&["init", "--quiet", "--bare", &dir]).await?;
    }
    Ok(repo_dir)
}

/// Fetch a commit into the mirror unless it is already present.
async fn fetch_commit(repo_dir: &Path, repo_url: &str, commit: &str) -> Result<(), GitError> {
    let git_dir = git_dir_arg(repo_dir);
    let probe = format!("{commit}^{{commit}}");
    let exists = run_git_unchecked(&[&git_dir, "cat-file", "-e", &probe]).await?;
    if exists.status.success() {
        return Ok(());
    }
    // Servers that don't allow fetching raw shas get a full branch fetch
    // instead, after which the commit should be reachable locally.
    let direct =
        run_git_unchecked(&[&git_dir, "fetch", "--quiet", "--force", "--depth", "1", repo_url, commit])
            .await?;
    if direct.status.success() {
        return Ok(());
    }
    run_git(&[&git_dir, "fetch", "--quiet", "--force", repo_url, "+refs/heads/*:refs/heads/*"])
        .await?;
    let exists = run_git_unchecked(&[&git_dir, "cat-file", "-e", &probe]).await?;
    if exists.status.success() {
        Ok(())
    } else {
        Err(GitError::Command {
            command: "fetch".to_string(),
            stderr: format!("commit {commit} not found in {repo_url}"),
        })
    }
}

async fn run_git_unchecked(args: &[&str]) -> Result<Output, GitError> {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .kill_on_drop(true);
    let verb = args.iter().find(|a| !a.starts_with("--")).copied().unwrap_or("");
    match tokio::time::timeout(GIT_TIMEOUT, cmd.output()).await {
        Ok(output) => Ok(output?),
        Err(_) => {
            Err(GitError::Timeout { command: verb.to_string(), seconds: GIT_TIMEOUT.as_secs() })
        }
    }
}

async fn run_git(args: &[&str]) -> Result<Output, GitError> {
    let output = run_git_unchecked(args).await?;
    if output.status.success() {
        Ok(output)
    } else {
        let verb = args.iter().find(|a| !a.starts_with("--")).copied().unwrap_or("");
        Err(GitError::Command {
            command: verb.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
