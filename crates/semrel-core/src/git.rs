//! Git operations for release workflows.
//!
//! Shells out to `git` for all operations. This ensures we inherit the user's
//! SSH keys, GPG signing, hooks, and other configuration.
//!
//! Read-only queries are free functions. The write side used by publication
//! steps sits behind the [`Vcs`] trait so plans can run against a test double.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use semver::Version;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::version::{tag_glob, version_from_tag};

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "status").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepo,
}

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// A commit as read from the log, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommit {
    /// Full commit hash.
    pub hash: String,
    /// Full commit message (subject, body and trailers).
    pub message: String,
}

/// Check if `root` is inside a git work tree.
#[instrument]
pub fn is_inside_repo(root: &Utf8Path) -> GitResult<bool> {
    match git_in(root, &["rev-parse", "--is-inside-work-tree"]) {
        Ok(output) => Ok(output.trim() == "true"),
        Err(GitError::Command { .. } | GitError::NotARepo) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Check whether the working tree is clean (no uncommitted changes).
#[instrument]
pub fn is_clean(root: &Utf8Path) -> GitResult<bool> {
    let output = git_in(root, &["status", "--porcelain"])?;
    let clean = output.trim().is_empty();
    debug!(clean, "working tree status");
    Ok(clean)
}

/// Get the current branch name.
///
/// Returns `None` if in a detached HEAD state.
#[instrument]
pub fn current_branch(root: &Utf8Path) -> GitResult<Option<String>> {
    let output = git_in(root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let branch = output.trim().to_string();
    if branch == "HEAD" {
        debug!("detached HEAD");
        Ok(None)
    } else {
        debug!(%branch, "current branch");
        Ok(Some(branch))
    }
}

/// Check whether the local branch is in sync with its remote tracking branch.
///
/// Returns `true` if there is no upstream configured.
#[instrument]
#[expect(clippy::literal_string_with_formatting_args)]
pub fn is_remote_in_sync(root: &Utf8Path) -> GitResult<bool> {
    // @{upstream} is a git refspec, not a format arg
    let Ok(upstream) = git_in(root, &["rev-parse", "--abbrev-ref", "@{upstream}"]) else {
        debug!("no upstream tracking branch");
        return Ok(true);
    };
    let upstream = upstream.trim();

    // A failed fetch leaves the last known remote state, which is still worth comparing.
    let _ = git_in(root, &["fetch", "--quiet"]);

    let local = git_in(root, &["rev-parse", "HEAD"])?.trim().to_string();
    let remote = git_in(root, &["rev-parse", upstream])?.trim().to_string();

    let in_sync = local == remote;
    debug!(%local, %remote, in_sync, "remote sync check");
    Ok(in_sync)
}

/// Latest tag reachable from HEAD that matches `tag_format`.
///
/// Tags that match the glob but do not carry a valid version are skipped.
#[instrument]
pub fn latest_version_tag(
    root: &Utf8Path,
    tag_format: &str,
) -> GitResult<Option<(String, Version)>> {
    let glob = tag_glob(tag_format);
    let output = git_in(
        root,
        &[
            "tag",
            "--list",
            &glob,
            "--merged",
            "HEAD",
            "--sort=-version:refname",
        ],
    )?;

    let found = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|tag| {
            version_from_tag(tag_format, tag)
                .ok()
                .filter(|v| v.pre.is_empty())
                .map(|v| (tag.to_string(), v))
        });
    debug!(tag = ?found.as_ref().map(|(t, _)| t), "latest version tag");
    Ok(found)
}

/// Commits after `since` up to HEAD, oldest first.
///
/// With `since = None` the whole history of HEAD is returned.
pub fn commits_since(root: &Utf8Path, since: Option<&str>) -> GitResult<Vec<RawCommit>> {
    commits_between(root, since, "HEAD")
}

/// Commits after `from` up to and including `to`, oldest first.
#[instrument]
pub fn commits_between(root: &Utf8Path, from: Option<&str>, to: &str) -> GitResult<Vec<RawCommit>> {
    let range = from.map_or_else(|| to.to_string(), |from| format!("{from}..{to}"));

    // Unit separator between hash and message, record separator between commits.
    let output = git_in(root, &["log", "--reverse", "--format=%H%x1f%B%x1e", &range])?;

    let commits: Vec<RawCommit> = output
        .split('\x1e')
        .filter_map(|record| {
            let (hash, message) = record.trim_start_matches('\n').split_once('\x1f')?;
            Some(RawCommit {
                hash: hash.trim().to_string(),
                message: message.trim_end().to_string(),
            })
        })
        .collect();

    debug!(count = commits.len(), %range, "commits read");
    Ok(commits)
}

/// Get the remote URL for a named remote (default: `"origin"`).
#[instrument]
pub fn remote_url(root: &Utf8Path, remote: &str) -> GitResult<Option<String>> {
    match git_in(root, &["remote", "get-url", remote]) {
        Ok(url) => {
            let url = url.trim().to_string();
            debug!(%remote, %url, "remote URL");
            Ok(Some(url))
        }
        Err(GitError::Command { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Parse owner and repo from a git remote URL.
///
/// Handles both HTTPS and SSH formats:
/// - `https://github.com/owner/repo.git`
/// - `git@github.com:owner/repo.git`
///
/// Returns `None` if the URL cannot be parsed.
pub fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    let (_, path) = split_remote(url)?;
    let (owner, repo) = path.split_once('/')?;

    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }

    Some((owner.to_string(), repo.to_string()))
}

/// Browsable HTTPS URL for a remote, used for commit and compare links.
///
/// `git@github.com:owner/repo.git` becomes `https://github.com/owner/repo`.
pub fn browse_url(url: &str) -> Option<String> {
    let (host, path) = split_remote(url)?;
    parse_owner_repo(url)?;
    Some(format!("https://{host}/{path}"))
}

/// Split a remote URL into host and `owner/repo` path without `.git`.
fn split_remote(url: &str) -> Option<(&str, &str)> {
    let (host, path) = if let Some(rest) = url.strip_prefix("git@") {
        rest.split_once(':')?
    } else {
        let after_scheme = url.split("//").nth(1)?;
        let after_auth = after_scheme.rsplit_once('@').map_or(after_scheme, |(_, h)| h);
        after_auth.split_once('/')?
    };
    let path = path.trim_end_matches('/');
    Some((host, path.strip_suffix(".git").unwrap_or(path)))
}

/// Write operations used by publication steps.
pub trait Vcs {
    /// Hash of the current HEAD commit.
    fn head(&self) -> GitResult<String>;

    /// Commit a tag points at, or `None` if the tag does not exist.
    fn tag_target(&self, tag: &str) -> GitResult<Option<String>>;

    /// Stage `paths` and commit them with `message`.
    ///
    /// Returns `None` when there was nothing to commit.
    fn commit(&self, paths: &[String], message: &str) -> GitResult<Option<String>>;

    /// Create a lightweight tag at HEAD.
    fn create_tag(&self, tag: &str) -> GitResult<()>;

    /// Push HEAD to `branch` on `remote`.
    fn push_branch(&self, remote: &str, branch: &str) -> GitResult<()>;

    /// Push a tag to `remote`.
    fn push_tag(&self, remote: &str, tag: &str) -> GitResult<()>;
}

/// [`Vcs`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct SystemGit {
    root: Utf8PathBuf,
}

impl SystemGit {
    /// Operate on the repository at `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Vcs for SystemGit {
    fn head(&self) -> GitResult<String> {
        Ok(git_in(&self.root, &["rev-parse", "HEAD"])?.trim().to_string())
    }

    fn tag_target(&self, tag: &str) -> GitResult<Option<String>> {
        let rev = format!("refs/tags/{tag}^{{commit}}");
        match git_in(&self.root, &["rev-parse", "--verify", "--quiet", &rev]) {
            Ok(hash) => Ok(Some(hash.trim().to_string())),
            Err(GitError::Command { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, message), fields(root = %self.root))]
    fn commit(&self, paths: &[String], message: &str) -> GitResult<Option<String>> {
        let existing: Vec<&str> = paths
            .iter()
            .map(String::as_str)
            .filter(|p| self.root.join(p).exists())
            .collect();
        if existing.is_empty() {
            debug!("no asset exists on disk");
            return Ok(None);
        }

        let mut add = vec!["add", "--"];
        add.extend(&existing);
        git_in(&self.root, &add)?;

        // `diff --cached --quiet` exits 1 when something is staged.
        if git_in(&self.root, &["diff", "--cached", "--quiet"]).is_ok() {
            debug!("nothing staged");
            return Ok(None);
        }

        git_in(&self.root, &["commit", "--message", message])?;
        let hash = self.head()?;
        debug!(%hash, "release commit created");
        Ok(Some(hash))
    }

    fn create_tag(&self, tag: &str) -> GitResult<()> {
        git_in(&self.root, &["tag", tag])?;
        debug!(%tag, "tag created");
        Ok(())
    }

    fn push_branch(&self, remote: &str, branch: &str) -> GitResult<()> {
        let refspec = format!("HEAD:refs/heads/{branch}");
        git_in(&self.root, &["push", remote, &refspec])?;
        Ok(())
    }

    fn push_tag(&self, remote: &str, tag: &str) -> GitResult<()> {
        let refspec = format!("refs/tags/{tag}");
        git_in(&self.root, &["push", remote, &refspec])?;
        Ok(())
    }
}

/// Run a git command in `root` and return its stdout.
fn git_in(root: &Utf8Path, args: &[&str]) -> GitResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root.as_std_path())
        .output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if stderr.contains("not a git repository") {
            return Err(GitError::NotARepo);
        }

        Err(GitError::Command {
            command: args.first().unwrap_or(&"").to_string(),
            stderr,
        })
    }
}
