// src/git.rs

//! Git metadata and repository synchronization
//!
//! All operations shell out to `git` through a [`CommandRunner`]. Nothing is
//! cached: every call reflects the working copy as it is right now.

use crate::error::{Error, Result};
use crate::process::{CommandRunner, Invocation, OutputMode};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Snapshot of a working copy's git state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitInfo {
    /// First fetch URL as reported by `git remote -v`
    pub remote: String,
    /// `remote` rewritten to `https://host/org/repo` form
    pub http_remote: String,
    /// Abbreviated commit hash of HEAD
    pub commit: String,
    /// Selected tag containing HEAD, empty when there is none
    pub tag: String,
    /// Checked-out branch, empty when HEAD is detached
    pub branch: String,
    /// Repository name (last path segment of the remote)
    pub name: String,
    /// Committer date of HEAD
    pub date: Option<DateTime<FixedOffset>>,
}

/// Normalize a repository URL for comparison
///
/// SSH forms (`git@host:org/repo.git`, `ssh://git@host/org/repo`) become
/// `https://host/org/repo`; trailing slashes and `.git` are dropped.
pub fn normalize_remote(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);

    if let Some(rest) = url.strip_prefix("git@") {
        return format!("https://{}", rest.replacen(':', "/", 1));
    }
    if let Some(rest) = url.strip_prefix("ssh://") {
        let rest = rest.strip_prefix("git@").unwrap_or(rest);
        return format!("https://{}", rest);
    }
    url.to_string()
}

/// Short repository name from a URL (`https://github.com/org/repo.git` -> `repo`)
pub fn repo_name_from_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let last = url.rsplit(['/', ':']).next().unwrap_or(url);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

/// Pick the tag to report for HEAD
///
/// The requested version wins when it is among `tags`. Otherwise the
/// greatest semantic version (a leading `v` is ignored) is chosen, and if no
/// tag parses as one, the lexicographically greatest tag.
pub fn select_tag(tags: &[String], version: Option<&str>) -> String {
    if tags.is_empty() {
        return String::new();
    }
    if let Some(version) = version {
        if tags.iter().any(|t| t == version) {
            return version.to_string();
        }
    }

    let semver_max = tags
        .iter()
        .filter_map(|t| {
            semver::Version::parse(t.strip_prefix('v').unwrap_or(t))
                .ok()
                .map(|v| (v, t))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, t)| t.clone());

    semver_max.unwrap_or_else(|| tags.iter().max().cloned().unwrap_or_default())
}

fn git(dir: &Path) -> Invocation {
    Invocation::new("git").arg("-C").arg(dir.to_string_lossy())
}

fn run_git(runner: &dyn CommandRunner, inv: Invocation, mode: OutputMode) -> Result<String> {
    runner
        .run(&inv, mode)
        .map(|out| out.stdout)
        .map_err(|e| Error::VcsError(e.to_string()))
}

/// First fetch URL of a working copy, or `None` when it has no remote
fn first_remote(runner: &dyn CommandRunner, dir: &Path) -> Result<Option<String>> {
    let stdout = run_git(runner, git(dir).args(["remote", "-v"]), OutputMode::Buffered)?;
    Ok(stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string))
}

/// Collect git metadata for a working copy
///
/// `version` is the tag or branch the caller asked for; it only influences
/// which tag is reported when several tags contain HEAD.
pub fn git_info(runner: &dyn CommandRunner, dir: &Path, version: Option<&str>) -> Result<GitInfo> {
    debug!("Reading git info for {}", dir.display());

    let remote = first_remote(runner, dir)?.unwrap_or_default();
    let http_remote = normalize_remote(&remote);
    let name = if http_remote.is_empty() {
        String::new()
    } else {
        repo_name_from_url(&http_remote)
    };

    let commit = run_git(
        runner,
        git(dir).args(["log", "-1", "--pretty=%h"]),
        OutputMode::Buffered,
    )?
    .trim()
    .to_string();

    let tags: Vec<String> = run_git(
        runner,
        git(dir).args(["tag", "--contains", "HEAD"]),
        OutputMode::Buffered,
    )?
    .lines()
    .map(|l| l.trim().to_string())
    .filter(|l| !l.is_empty())
    .collect();
    let tag = select_tag(&tags, version);

    let branch = run_git(
        runner,
        git(dir).args(["rev-parse", "--abbrev-ref", "HEAD"]),
        OutputMode::Buffered,
    )?
    .trim()
    .to_string();
    let branch = if branch == "HEAD" { String::new() } else { branch };

    let raw_date = run_git(
        runner,
        git(dir).args(["log", "-1", "--format=%cI"]),
        OutputMode::Buffered,
    )?;
    let date = match DateTime::parse_from_rfc3339(raw_date.trim()) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!("Unparsable commit date '{}' in {}: {}", raw_date.trim(), dir.display(), e);
            None
        }
    };

    Ok(GitInfo {
        remote,
        http_remote,
        commit,
        tag,
        branch,
        name,
        date,
    })
}

/// Make `dir` a checkout of `url` at `version` (branch or tag)
///
/// A missing directory, or one whose remote is a different repository, is
/// replaced by a fresh shallow clone. An existing checkout is hard-reset when
/// dirty, checked out when on another ref, and pulled when on a branch.
pub fn pull_repository(runner: &dyn CommandRunner, dir: &Path, url: &str, version: &str) -> Result<()> {
    if dir.exists() {
        let matches = match first_remote(runner, dir) {
            Ok(Some(remote)) => normalize_remote(&remote) == normalize_remote(url),
            Ok(None) => false,
            Err(e) => {
                debug!("{} is not a usable git checkout: {}", dir.display(), e);
                false
            }
        };

        if matches {
            return update_checkout(runner, dir, version);
        }

        warn!(
            "Directory {} does not track {}; removing it before cloning",
            dir.display(),
            url
        );
        fs::remove_dir_all(dir)?;
    }

    if let Some(parent) = dir.parent() {
        fs::create_dir_all(parent)?;
    }

    println!("Cloning {} to {}", url, dir.display());
    run_git(
        runner,
        Invocation::new("git").args([
            "-c",
            "advice.detachedHead=false",
            "clone",
            url,
            "--branch",
            version,
            "--depth",
            "1",
            dir.to_string_lossy().as_ref(),
        ]),
        OutputMode::Realtime,
    )?;
    Ok(())
}

fn update_checkout(runner: &dyn CommandRunner, dir: &Path, version: &str) -> Result<()> {
    let diff = run_git(runner, git(dir).args(["diff", "--shortstat"]), OutputMode::Buffered)?;
    let current = git_info(runner, dir, Some(version))?;

    let dirty = !diff.trim().is_empty();
    let checkout_required = current.branch != version && current.tag != version;

    if dirty || checkout_required {
        info!("Updating {} to {}", dir.display(), version);
    }

    if dirty {
        warn!(
            "Directory {} is dirty. Attempting hard reset before updating",
            dir.display()
        );
        run_git(runner, git(dir).args(["reset", "--hard"]), OutputMode::Realtime)?;
    }

    let on_branch = if checkout_required {
        info!("Checking out {} in {}", version, dir.display());
        run_git(runner, git(dir).args(["checkout", version]), OutputMode::Realtime)?;
        let head = run_git(
            runner,
            git(dir).args(["rev-parse", "--abbrev-ref", "HEAD"]),
            OutputMode::Buffered,
        )?;
        head.trim() != "HEAD"
    } else {
        !current.branch.is_empty()
    };

    if on_branch {
        run_git(runner, git(dir).arg("pull"), OutputMode::Buffered)?;
    } else {
        debug!("{} is detached at {}; nothing to pull", dir.display(), version);
    }
    Ok(())
}
