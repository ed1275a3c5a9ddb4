//! Release orchestration.
//!
//! Planning and execution are separate so the CLI can show what will
//! happen before anything does:
//!
//! 1. [`plan_release`] validates the configuration, gates on the release
//!    branch, reads commits since the latest version tag and classifies
//!    them into an [`Analysis`].
//! 2. [`ReadyRelease::execute`] runs the publication plan over a fresh
//!    [`PipelineContext`], reporting progress through a callback.

use camino::{Utf8Path, Utf8PathBuf};
use semver::Version;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::commit::{self, ClassifiedCommit, Rejection};
use crate::config::{Config, LintConfig, NotesSection};
use crate::error::ConfigError;
use crate::exec::Shell;
use crate::git::{self, GitError, RawCommit, Vcs};
use crate::notes::{self, NotesHeader};
use crate::pipeline::{PipelineContext, PipelineContextInit, iso_date_today};
use crate::plan::{self, Halted, StepEnv, StepEvent, StepRecord, StepSpec};
use crate::rules::{self, ReleaseRule};
use crate::version::{self, ReleaseType, VersionError, format_tag};

/// Errors that stop a release run.
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// The configuration cannot drive a release.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The project root is not inside a git work tree.
    #[error("{0} is not inside a git repository")]
    NotARepo(Utf8PathBuf),

    /// Releases are not made from this branch.
    #[error("releases are made from [{}], not from '{branch}'", .allowed.join(", "))]
    WrongBranch {
        /// The current branch.
        branch: String,
        /// The configured release branches.
        allowed: Vec<String>,
    },

    /// HEAD is not on a branch.
    #[error("HEAD is detached; check out a release branch")]
    DetachedHead,

    /// Reading repository state failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// A version could not be parsed.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// A publication step failed.
    #[error(transparent)]
    Halted(#[from] Box<Halted>),
}

/// Result alias for release operations.
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Run-level switches from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseOptions {
    /// Run pure steps; side-effecting steps only report what they would do.
    pub dry_run: bool,
    /// Never push, whatever the plan says.
    pub no_push: bool,
    /// Skip the release branch check.
    pub any_branch: bool,
}

// ──────────────────────────────────────────────
// Analysis
// ──────────────────────────────────────────────

/// A classified commit and what it contributes to the decision.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedCommit {
    /// The classified commit.
    #[serde(flatten)]
    pub commit: ClassifiedCommit,
    /// The release type of its first matching rule.
    pub release: ReleaseType,
}

/// A commit that failed classification.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedCommit {
    /// Full commit hash.
    pub hash: String,
    /// First line of the message.
    pub header: String,
    /// Why it was rejected.
    pub reason: Rejection,
}

/// Classification of a batch of commits and the resulting decision.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// Commits that classified, oldest first.
    pub accepted: Vec<AcceptedCommit>,
    /// Commits that did not; they take no part in the decision.
    pub rejected: Vec<RejectedCommit>,
    /// Hashes of merge, fixup and revert commits that were skipped.
    pub ignored: Vec<String>,
    /// The strongest contribution of any accepted commit.
    pub release: ReleaseType,
}

impl Analysis {
    /// The accepted commits without their contributions.
    pub fn commits(&self) -> Vec<ClassifiedCommit> {
        self.accepted.iter().map(|a| a.commit.clone()).collect()
    }
}

/// Classify `commits` and decide the release type.
///
/// A rejection drops that one commit; the batch continues.
#[instrument(skip_all, fields(commits = commits.len()))]
pub fn analyze_commits(commits: &[RawCommit], lint: &LintConfig, rules: &[ReleaseRule]) -> Analysis {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    let mut ignored = Vec::new();

    for raw in commits {
        if lint.default_ignores && commit::is_ignored(&raw.message) {
            debug!(hash = %raw.hash, "ignored commit");
            ignored.push(raw.hash.clone());
            continue;
        }
        match commit::classify(&raw.message, lint) {
            Ok(message) => {
                let release = rules::contribution(rules, &message);
                accepted.push(AcceptedCommit {
                    commit: ClassifiedCommit {
                        hash: raw.hash.clone(),
                        message,
                    },
                    release,
                });
            }
            Err(reason) => {
                let header = raw.message.lines().next().unwrap_or_default().to_string();
                warn!(hash = %raw.hash, %header, %reason, "rejected commit");
                rejected.push(RejectedCommit {
                    hash: raw.hash.clone(),
                    header,
                    reason,
                });
            }
        }
    }

    let release = rules::decide(rules, accepted.iter().map(|a| &a.commit.message));
    info!(
        accepted = accepted.len(),
        rejected = rejected.len(),
        ignored = ignored.len(),
        %release,
        "commits analyzed"
    );

    Analysis {
        accepted,
        rejected,
        ignored,
        release,
    }
}

// ──────────────────────────────────────────────
// Plan
// ──────────────────────────────────────────────

/// A release that has been analyzed and is ready to run.
#[derive(Debug)]
pub struct ReadyRelease {
    /// Project root.
    pub root: Utf8PathBuf,
    /// Branch being released, if HEAD is on one.
    pub branch: Option<String>,
    /// Latest version tag before this release.
    pub previous: Option<(String, Version)>,
    /// Commit classification and decision.
    pub analysis: Analysis,
    /// The version this release would carry.
    pub next_version: Option<Version>,
    /// The tag this release would carry.
    pub next_tag: Option<String>,
    /// Steps to run.
    pub steps: Vec<StepSpec>,
    /// Run switches.
    pub options: ReleaseOptions,
    /// Loaded configuration.
    pub config: Config,
    owner: String,
    repo: String,
    repo_url: Option<String>,
}

/// Analyze the repository at `root` and prepare a release.
#[instrument(skip(config, options), fields(%root))]
pub fn plan_release(root: &Utf8Path, config: &Config, options: ReleaseOptions) -> ReleaseResult<ReadyRelease> {
    config.validate()?;
    if !git::is_inside_repo(root)? {
        return Err(ReleaseError::NotARepo(root.to_owned()));
    }

    let branch = git::current_branch(root)?;
    if !options.any_branch {
        let Some(current) = branch.as_deref() else {
            return Err(ReleaseError::DetachedHead);
        };
        if !config.release.branches.iter().any(|b| b == current) {
            return Err(ReleaseError::WrongBranch {
                branch: current.to_string(),
                allowed: config.release.branches.clone(),
            });
        }
    }

    let release = &config.release;
    let previous = git::latest_version_tag(root, &release.tag_format)?;
    let raw = git::commits_since(root, previous.as_ref().map(|(tag, _)| tag.as_str()))?;
    let analysis = analyze_commits(&raw, &config.lint, &release.rules);

    let next_version = version::release_version(
        previous.as_ref().map(|(_, v)| v),
        analysis.release,
        &release.initial_version,
    );
    let next_tag = next_version
        .as_ref()
        .map(|v| format_tag(&release.tag_format, v));

    let remote = git::remote_url(root, &release.remote)?;
    let (owner, repo) = remote
        .as_deref()
        .and_then(git::parse_owner_repo)
        .unwrap_or_else(|| ("unknown".into(), "unknown".into()));
    let repo_url = remote.as_deref().and_then(git::browse_url);

    info!(
        previous = ?previous.as_ref().map(|(tag, _)| tag),
        next = ?next_tag,
        "release planned"
    );

    Ok(ReadyRelease {
        root: root.to_owned(),
        branch,
        previous,
        analysis,
        next_version,
        next_tag,
        steps: config.plan(),
        options,
        config: config.clone(),
        owner,
        repo,
        repo_url,
    })
}

// ──────────────────────────────────────────────
// Execute
// ──────────────────────────────────────────────

/// Outcome of a release run.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseOutcome {
    /// Whether a version was released.
    pub released: bool,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Every step that ran, in order.
    pub steps: Vec<StepRecord>,
    /// Accumulated run data.
    pub context: PipelineContext,
}

impl ReadyRelease {
    /// Whether the analysis calls for a release.
    pub const fn is_release(&self) -> bool {
        self.analysis.release.is_release()
    }

    /// Release notes as they would be generated now, if anything is released.
    pub fn notes_preview(&self) -> Option<String> {
        let version = self.next_version.as_ref()?.to_string();
        let tag = self.next_tag.as_deref()?;
        let date = iso_date_today();
        let header = NotesHeader {
            version: &version,
            tag,
            previous_tag: self.previous.as_ref().map(|(t, _)| t.as_str()),
            date: &date,
            release_type: self.analysis.release,
            repo_url: self.repo_url.as_deref(),
        };
        Some(notes::render(
            &header,
            &self.analysis.commits(),
            &self.config.notes.sections,
        ))
    }

    fn context(&self) -> PipelineContext {
        let (previous_tag, previous_version) = self.previous.clone().unzip();
        PipelineContext::new(PipelineContextInit {
            previous_version,
            previous_tag,
            tag_format: self.config.release.tag_format.clone(),
            initial_version: self.config.release.initial_version.clone(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            repo_url: self.repo_url.clone(),
            branch: self.branch.clone(),
            commits: self.analysis.commits(),
            dry_run: self.options.dry_run,
        })
    }

    /// Run the publication plan.
    ///
    /// Calls `on_event` at step boundaries so the CLI can update progress
    /// display.
    #[instrument(skip_all, fields(next = ?self.next_tag, dry_run = self.options.dry_run))]
    pub fn execute(
        self,
        shell: &dyn Shell,
        vcs: &dyn Vcs,
        on_event: impl FnMut(StepEvent),
    ) -> ReleaseResult<ReleaseOutcome> {
        let mut context = self.context();
        let env = StepEnv {
            root: &self.root,
            shell,
            vcs,
            rules: &self.config.release.rules,
            notes: &self.config.notes.sections,
            remote: &self.config.release.remote,
            no_push: self.options.no_push,
        };

        let result = plan::execute(&self.steps, &mut context, &env, on_event).map_err(Box::new)?;

        Ok(ReleaseOutcome {
            released: result.released,
            dry_run: self.options.dry_run,
            steps: result.steps,
            context,
        })
    }
}

/// Release rules in display form, in evaluation order.
pub fn describe_rules(rules: &[ReleaseRule]) -> Vec<String> {
    rules
        .iter()
        .map(|rule| format!("{} → {}", rule.predicate, rule.release))
        .collect()
}

/// Notes sections in display form.
pub fn describe_sections(sections: &[NotesSection]) -> Vec<String> {
    sections
        .iter()
        .map(|s| format!("{} → {}", s.commit_type, s.title))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;

    use tempfile::TempDir;

    use crate::exec::SystemShell;
    use crate::git::SystemGit;
    use crate::plan::{StepKind, StepOutcome};

    fn raw(hash: &str, message: &str) -> RawCommit {
        RawCommit {
            hash: hash.into(),
            message: message.into(),
        }
    }

    #[test]
    fn rejections_do_not_stop_the_batch() {
        let commits = vec![
            raw("a", "feat: add thing"),
            raw("b", "feature: not a type"),
            raw("c", "no header at all"),
            raw("d", "fix: repair"),
        ];
        let analysis = analyze_commits(&commits, &LintConfig::default(), &rules::default_rules());

        assert_eq!(analysis.accepted.len(), 2);
        assert_eq!(analysis.rejected.len(), 2);
        assert!(matches!(
            analysis.rejected[0].reason,
            Rejection::UnknownType { .. }
        ));
        assert!(matches!(
            analysis.rejected[1].reason,
            Rejection::MalformedHeader { .. }
        ));
        assert_eq!(analysis.release, ReleaseType::Minor);
        assert_eq!(analysis.accepted[1].release, ReleaseType::Patch);
    }

    #[test]
    fn ignored_commits_are_skipped() {
        let commits = vec![
            raw("a", "Merge branch 'feature' into main"),
            raw("b", "fixup! fix: repair"),
            raw("c", "docs: readme"),
        ];
        let analysis = analyze_commits(&commits, &LintConfig::default(), &rules::default_rules());
        assert_eq!(analysis.ignored, vec!["a", "b"]);
        assert!(analysis.rejected.is_empty());
        assert_eq!(analysis.release, ReleaseType::NoRelease);
    }

    #[test]
    fn ignores_can_be_disabled() {
        let lint = LintConfig {
            default_ignores: false,
            ..LintConfig::default()
        };
        let analysis = analyze_commits(
            &[raw("a", "Merge branch 'x'")],
            &lint,
            &rules::default_rules(),
        );
        assert_eq!(analysis.rejected.len(), 1);
    }

    #[test]
    fn no_release_scope_suppresses_breaking() {
        let analysis = analyze_commits(
            &[raw("a", "feat(no-release)!: internal only")],
            &LintConfig::default(),
            &rules::default_rules(),
        );
        assert_eq!(analysis.release, ReleaseType::NoRelease);
    }

    #[test]
    fn analysis_serializes_flat() {
        let analysis = analyze_commits(
            &[raw("abc", "feat(cli): flag")],
            &LintConfig::default(),
            &rules::default_rules(),
        );
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["release"], "minor");
        assert_eq!(json["accepted"][0]["hash"], "abc");
        assert_eq!(json["accepted"][0]["message"]["type"], "feat");
        assert_eq!(json["accepted"][0]["release"], "minor");
    }

    fn git(root: &Utf8Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(root)
            .output()
            .unwrap()
            .status;
        assert!(status.success(), "git {args:?}");
    }

    fn scratch_repo() -> Option<(TempDir, Utf8PathBuf)> {
        which::which("git").ok()?;
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        git(&root, &["init", "--quiet", "--initial-branch=main"]);
        git(&root, &["config", "user.name", "Release Bot"]);
        git(&root, &["config", "user.email", "bot@example.com"]);
        git(&root, &["config", "commit.gpgsign", "false"]);
        git(&root, &["config", "tag.gpgsign", "false"]);
        Some((tmp, root))
    }

    fn commit(root: &Utf8Path, file: &str, message: &str) {
        fs::write(root.join(file), message).unwrap();
        git(root, &["add", file]);
        git(root, &["commit", "--quiet", "--message", message]);
    }

    fn local_plan() -> Vec<StepSpec> {
        vec![
            StepSpec::new(StepKind::Analyze),
            StepSpec::new(StepKind::GenerateNotes),
            StepSpec::new(StepKind::Changelog {
                path: "CHANGELOG.md".into(),
                title: Some("# Changelog".into()),
            }),
            StepSpec::new(StepKind::Git {
                assets: None,
                message: plan::DEFAULT_COMMIT_MESSAGE.into(),
                push: false,
            }),
            StepSpec::new(StepKind::Tag { push: false }),
        ]
    }

    #[test]
    fn wrong_branch_is_refused() {
        let Some((_tmp, root)) = scratch_repo() else {
            return;
        };
        commit(&root, "a", "feat: first");
        git(&root, &["checkout", "--quiet", "-b", "topic"]);

        let err = plan_release(&root, &Config::default(), ReleaseOptions::default()).unwrap_err();
        assert!(matches!(err, ReleaseError::WrongBranch { ref branch, .. } if branch == "topic"));

        let options = ReleaseOptions {
            any_branch: true,
            ..ReleaseOptions::default()
        };
        assert!(plan_release(&root, &Config::default(), options).is_ok());
    }

    #[test]
    fn end_to_end_first_then_minor_release() {
        let Some((_tmp, root)) = scratch_repo() else {
            return;
        };
        let mut config = Config::default();
        config.steps = local_plan();

        commit(&root, "a", "feat: first feature");
        let ready = plan_release(&root, &config, ReleaseOptions::default()).unwrap();
        assert_eq!(ready.next_version, Some(Version::new(1, 0, 0)));
        let outcome = ready.execute(&SystemShell, &SystemGit::new(&root), |_| {}).unwrap();
        assert!(outcome.released);
        assert_eq!(outcome.context.tag.as_deref(), Some("v1.0.0"));

        commit(&root, "b", "fix(parser): handle tabs");
        commit(&root, "c", "feat(cli): add flag");
        let ready = plan_release(&root, &config, ReleaseOptions::default()).unwrap();
        assert_eq!(ready.previous.as_ref().map(|(t, _)| t.as_str()), Some("v1.0.0"));
        assert_eq!(ready.analysis.accepted.len(), 2);
        assert_eq!(ready.next_tag.as_deref(), Some("v1.1.0"));
        let preview = ready.notes_preview().unwrap();
        assert!(preview.contains("**cli:** add flag"));

        let outcome = ready.execute(&SystemShell, &SystemGit::new(&root), |_| {}).unwrap();
        assert!(outcome.released);

        let changelog = fs::read_to_string(root.join("CHANGELOG.md")).unwrap();
        assert!(changelog.starts_with("# Changelog\n\n# 1.1.0"));
        assert!(changelog.contains("# 1.0.0"));

        // The tag sits on the release commit, so nothing is pending.
        let ready = plan_release(&root, &config, ReleaseOptions::default()).unwrap();
        assert_eq!(ready.previous.as_ref().map(|(t, _)| t.as_str()), Some("v1.1.0"));
        assert!(!ready.is_release());
        let outcome = ready.execute(&SystemShell, &SystemGit::new(&root), |_| {}).unwrap();
        assert!(!outcome.released);
        assert!(matches!(
            outcome.steps[0].outcome,
            StepOutcome::NoRelease { .. }
        ));
    }

    #[test]
    fn halted_step_surfaces_as_release_error() {
        let Some((_tmp, root)) = scratch_repo() else {
            return;
        };
        commit(&root, "a", "fix: first");
        let mut config = Config::default();
        config.steps = vec![
            StepSpec::new(StepKind::Analyze),
            StepSpec::new(StepKind::Exec {
                command: "exit 3".into(),
                name: Some("build".into()),
            }),
            StepSpec::new(StepKind::Tag { push: false }),
        ];

        let ready = plan_release(&root, &config, ReleaseOptions::default()).unwrap();
        let err = ready.execute(&SystemShell, &SystemGit::new(&root), |_| {}).unwrap_err();
        let ReleaseError::Halted(halted) = err else {
            panic!("expected a halted plan");
        };
        assert_eq!(halted.index, 2);
        assert_eq!(halted.step, "build");
        assert!(SystemGit::new(&root).tag_target("v1.0.0").unwrap().is_none());
    }
}
