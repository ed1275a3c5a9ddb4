//! Pipeline context, the accumulator for a release run.
//!
//! Every publication step reads from and contributes to a single
//! [`PipelineContext`]: `analyze` fills in the version, `generate-notes`
//! the notes, file-writing steps the asset list, `git` the commit hash.
//! The context is also part of the machine-readable release outcome.
//!
//! Version fields are strings so the JSON form stays readable by external
//! tooling without semver-aware parsing.

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::commit::ClassifiedCommit;
use crate::exec::CommandVars;
use crate::version::{ReleaseType, format_tag};

/// The release run accumulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineContext {
    // ── Version ──
    /// The new version, once `analyze` decided on a release.
    pub version: Option<String>,
    /// The previous version, `None` before the first release.
    pub previous_version: Option<String>,
    /// The tag for this release.
    pub tag: Option<String>,
    /// The tag of the previous release.
    pub previous_tag: Option<String>,
    /// The release decision.
    pub release_type: Option<ReleaseType>,
    /// Release date in `YYYY-MM-DD` format.
    pub date: String,
    /// Tag template (e.g. `v{version}`).
    pub tag_format: String,
    /// Version of the first release.
    pub initial_version: String,

    // ── Repository ──
    /// Repository owner (from git remote).
    pub owner: String,
    /// Repository name (from git remote).
    pub repo: String,
    /// Browsable repository URL, if the remote is a recognised host.
    pub repo_url: Option<String>,
    /// Branch being released.
    pub branch: Option<String>,

    // ── Inputs ──
    /// Accepted commits since the previous release, oldest first.
    pub commits: Vec<ClassifiedCommit>,

    // ── Step results ──
    /// Rendered release notes.
    pub notes: Option<String>,
    /// Files written by steps, relative to the project root.
    pub assets: Vec<String>,
    /// The release commit created by the git step.
    pub commit_hash: Option<String>,
    /// URL printed by the publish-notes command, if any.
    pub release_url: Option<String>,

    // ── Control ──
    /// Whether side-effecting steps only report what they would do.
    pub dry_run: bool,
}

/// Arguments for constructing a [`PipelineContext`].
pub struct PipelineContextInit {
    /// Previous version, if any release exists.
    pub previous_version: Option<Version>,
    /// Tag of the previous release.
    pub previous_tag: Option<String>,
    /// Tag template.
    pub tag_format: String,
    /// Version of the first release.
    pub initial_version: Version,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Browsable repository URL.
    pub repo_url: Option<String>,
    /// Branch being released.
    pub branch: Option<String>,
    /// Accepted commits since the previous release.
    pub commits: Vec<ClassifiedCommit>,
    /// Whether this is a dry run.
    pub dry_run: bool,
}

impl PipelineContext {
    /// Create a context for a run. Step results start empty.
    pub fn new(init: PipelineContextInit) -> Self {
        Self {
            version: None,
            previous_version: init.previous_version.map(|v| v.to_string()),
            tag: None,
            previous_tag: init.previous_tag,
            release_type: None,
            date: iso_date_today(),
            tag_format: init.tag_format,
            initial_version: init.initial_version.to_string(),
            owner: init.owner,
            repo: init.repo,
            repo_url: init.repo_url,
            branch: init.branch,
            commits: init.commits,
            notes: None,
            assets: Vec::new(),
            commit_hash: None,
            release_url: None,
            dry_run: init.dry_run,
        }
    }

    /// Derive [`CommandVars`] for command templates.
    pub fn vars(&self) -> CommandVars {
        CommandVars {
            version: self.version.clone().unwrap_or_default(),
            prev_version: self.previous_version.clone().unwrap_or_default(),
            tag: self.tag.clone().unwrap_or_default(),
            prev_tag: self.previous_tag.clone().unwrap_or_default(),
            release_type: self
                .release_type
                .map(|r| r.to_string())
                .unwrap_or_default(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            branch: self.branch.clone().unwrap_or_default(),
            notes_file: String::new(),
        }
    }

    /// Record the release decision and the version it leads to.
    pub fn record_analysis(&mut self, release_type: ReleaseType, version: Option<&Version>) {
        self.release_type = Some(release_type);
        self.version = version.map(ToString::to_string);
        self.tag = version.map(|v| format_tag(&self.tag_format, v));
    }

    /// Record rendered release notes.
    pub fn record_notes(&mut self, notes: String) {
        self.notes = Some(notes);
    }

    /// Add a file to the asset list, keeping first-seen order.
    pub fn record_asset(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.assets.contains(&path) {
            self.assets.push(path);
        }
    }

    /// Record the release commit.
    pub fn record_commit(&mut self, hash: Option<String>) {
        self.commit_hash = hash;
    }

    /// Record the URL of the published release.
    pub fn record_release(&mut self, url: Option<String>) {
        self.release_url = url;
    }
}

/// Today's date (UTC) as `YYYY-MM-DD`.
pub fn iso_date_today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_init() -> PipelineContextInit {
        PipelineContextInit {
            previous_version: Some(Version::new(1, 1, 0)),
            previous_tag: Some("v1.1.0".into()),
            tag_format: "v{version}".into(),
            initial_version: Version::new(1, 0, 0),
            owner: "renaultdigital".into(),
            repo: "bash-base".into(),
            repo_url: Some("https://github.com/renaultdigital/bash-base".into()),
            branch: Some("master".into()),
            commits: Vec::new(),
            dry_run: false,
        }
    }

    #[test]
    fn new_starts_without_release() {
        let ctx = PipelineContext::new(test_init());
        assert_eq!(ctx.previous_version.as_deref(), Some("1.1.0"));
        assert!(ctx.version.is_none());
        assert!(ctx.tag.is_none());
        assert!(ctx.notes.is_none());
        assert!(ctx.assets.is_empty());
        assert_eq!(ctx.initial_version, "1.0.0");
    }

    #[test]
    fn record_analysis_formats_tag() {
        let mut ctx = PipelineContext::new(test_init());
        ctx.record_analysis(ReleaseType::Minor, Some(&Version::new(1, 2, 0)));
        assert_eq!(ctx.version.as_deref(), Some("1.2.0"));
        assert_eq!(ctx.tag.as_deref(), Some("v1.2.0"));
        assert_eq!(ctx.release_type, Some(ReleaseType::Minor));
    }

    #[test]
    fn vars_reflect_context() {
        let mut ctx = PipelineContext::new(test_init());
        let before = ctx.vars();
        assert_eq!(before.version, "");
        assert_eq!(before.prev_tag, "v1.1.0");

        ctx.record_analysis(ReleaseType::Patch, Some(&Version::new(1, 1, 1)));
        let vars = ctx.vars();
        assert_eq!(vars.version, "1.1.1");
        assert_eq!(vars.tag, "v1.1.1");
        assert_eq!(vars.release_type, "patch");
        assert_eq!(vars.branch, "master");
    }

    #[test]
    fn assets_are_deduplicated() {
        let mut ctx = PipelineContext::new(test_init());
        ctx.record_asset("CHANGELOG.md");
        ctx.record_asset("package.json");
        ctx.record_asset("CHANGELOG.md");
        assert_eq!(ctx.assets, vec!["CHANGELOG.md", "package.json"]);
    }

    #[test]
    fn json_round_trip() {
        let mut ctx = PipelineContext::new(test_init());
        ctx.record_analysis(ReleaseType::Major, Some(&Version::new(2, 0, 0)));
        ctx.record_commit(Some("abc1234".into()));

        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"release_type\":\"major\""));
        let back: PipelineContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version, ctx.version);
        assert_eq!(back.commit_hash.as_deref(), Some("abc1234"));
        assert_eq!(back.date, ctx.date);
    }

    #[test]
    fn iso_date_today_format() {
        let date = iso_date_today();
        assert_eq!(date.len(), 10);
        assert_eq!(date.as_bytes()[4], b'-');
        assert_eq!(date.as_bytes()[7], b'-');
    }
}
