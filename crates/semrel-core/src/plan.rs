//! Publication plan execution.
//!
//! A plan is an ordered list of steps drawn from a closed set (the
//! [`StepKind`] tag is the registry key). Steps run strictly in order over
//! one shared [`PipelineContext`]:
//!
//! | step            | reads                 | writes / effect                   |
//! |-----------------|-----------------------|-----------------------------------|
//! | `analyze`       | commits, rules        | release type, version, tag        |
//! | `generate-notes`| version, commits      | notes                             |
//! | `changelog`     | notes                 | changelog file, asset             |
//! | `package`       | version               | manifest file, asset              |
//! | `exec`          | template vars         | arbitrary command                 |
//! | `git`           | assets, notes         | release commit, branch push       |
//! | `tag`           | tag                   | tag at HEAD, tag push             |
//! | `publish-notes` | notes                 | command fed a notes file          |
//!
//! A failing step halts the plan unless it is marked `best_effort`; nothing
//! is retried and completed steps are not rolled back. When `analyze`
//! finds nothing to release the plan stops early without error.

use std::io::Write as _;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::changelog::{self, ChangelogError};
use crate::config::NotesSection;
use crate::exec::{ExecError, Shell, interpolate};
use crate::git::{GitError, Vcs};
use crate::notes::{self, NotesHeader};
use crate::package::{self, PackageError};
use crate::pipeline::PipelineContext;
use crate::rules::{self, ReleaseRule};
use crate::version::{self, ReleaseType, VersionError, parse_version};

/// Default release commit message.
pub const DEFAULT_COMMIT_MESSAGE: &str = "chore(release): {version} [skip ci]\n\n{notes}";

// ──────────────────────────────────────────────
// Step declarations
// ──────────────────────────────────────────────

/// One entry of a publication plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// What the step does.
    #[serde(flatten)]
    pub kind: StepKind,
    /// Record a failure and continue instead of halting the plan.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub best_effort: bool,
}

impl StepSpec {
    /// A step that halts the plan on failure.
    pub const fn new(kind: StepKind) -> Self {
        Self {
            kind,
            best_effort: false,
        }
    }
}

/// The closed set of publication steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum StepKind {
    /// Decide the release type and next version.
    Analyze,
    /// Render release notes.
    GenerateNotes,
    /// Prepend the notes to a changelog file.
    Changelog {
        /// Changelog path relative to the project root.
        #[serde(default = "default_changelog_path")]
        path: String,
        /// Title kept as the first line of the file.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Rewrite the version in a JSON package manifest.
    Package {
        /// Manifest path relative to the project root.
        #[serde(default = "default_package_path")]
        path: String,
    },
    /// Run a shell command template.
    Exec {
        /// Command template; an empty command makes the step a no-op.
        command: String,
        /// Display name; defaults to the command.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Commit release assets and push the branch.
    Git {
        /// Files to commit; defaults to the assets written by earlier steps.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assets: Option<Vec<String>>,
        /// Commit message template; `{notes}` expands to the release notes.
        #[serde(default = "default_commit_message")]
        message: String,
        /// Push the branch after committing.
        #[serde(default = "default_true")]
        push: bool,
    },
    /// Tag HEAD with the release tag.
    Tag {
        /// Push the tag after creating it.
        #[serde(default = "default_true")]
        push: bool,
    },
    /// Run a command with the notes written to `{notes_file}`.
    PublishNotes {
        /// Command template; an empty command makes the step a no-op.
        command: String,
    },
}

fn default_changelog_path() -> String {
    "CHANGELOG.md".into()
}

fn default_package_path() -> String {
    "package.json".into()
}

fn default_commit_message() -> String {
    DEFAULT_COMMIT_MESSAGE.into()
}

const fn default_true() -> bool {
    true
}

impl StepKind {
    /// Registry key of the step.
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::GenerateNotes => "generate-notes",
            Self::Changelog { .. } => "changelog",
            Self::Package { .. } => "package",
            Self::Exec { .. } => "exec",
            Self::Git { .. } => "git",
            Self::Tag { .. } => "tag",
            Self::PublishNotes { .. } => "publish-notes",
        }
    }

    /// Display label: the key, or the name of an `exec` step.
    pub fn label(&self) -> String {
        match self {
            Self::Exec {
                name: Some(name), ..
            } => name.clone(),
            Self::Exec { command, .. } if !command.trim().is_empty() => format!("exec `{command}`"),
            other => other.key().to_string(),
        }
    }
}

/// The plan used when no steps are configured.
pub fn default_plan() -> Vec<StepSpec> {
    vec![
        StepSpec::new(StepKind::Analyze),
        StepSpec::new(StepKind::GenerateNotes),
        StepSpec::new(StepKind::Changelog {
            path: default_changelog_path(),
            title: None,
        }),
        StepSpec::new(StepKind::Git {
            assets: None,
            message: default_commit_message(),
            push: true,
        }),
        StepSpec::new(StepKind::Tag { push: true }),
    ]
}

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Why a single step failed.
#[derive(Error, Debug)]
pub enum StepError {
    /// A command exited non-zero.
    #[error("command `{command}` exited with {}", .exit_code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    CommandFailed {
        /// The interpolated command.
        command: String,
        /// Exit code; `None` if killed by a signal.
        exit_code: Option<i32>,
        /// Captured stdout.
        stdout: String,
        /// Captured stderr.
        stderr: String,
    },

    /// A command could not be started.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// A git operation failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// The changelog could not be updated.
    #[error(transparent)]
    Changelog(#[from] ChangelogError),

    /// The package manifest could not be updated.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// A version in the context is not valid semver.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// A step ran before the step that provides its input.
    #[error("{step} needs {field}; add an earlier step that provides it")]
    MissingContext {
        /// The step that ran.
        step: &'static str,
        /// The missing context field.
        field: &'static str,
    },

    /// The release tag exists and points at another commit.
    #[error("tag {tag} already exists at {existing}, but HEAD is {head}")]
    TagConflict {
        /// The release tag.
        tag: String,
        /// Commit the tag points at.
        existing: String,
        /// Current HEAD.
        head: String,
    },

    /// The notes file for `publish-notes` could not be written.
    #[error("failed to write release notes file: {0}")]
    NotesFile(#[source] std::io::Error),
}

/// Result alias for step execution.
pub type StepResult<T> = Result<T, StepError>;

/// A plan stopped at a failing step.
#[derive(Error, Debug)]
#[error("step {index} ({step}) failed: {cause}")]
pub struct Halted {
    /// 1-based position of the failing step in the plan.
    pub index: usize,
    /// Label of the failing step.
    pub step: String,
    /// What went wrong.
    #[source]
    pub cause: StepError,
    /// Steps that finished before the failure.
    pub completed: Vec<StepRecord>,
}

/// Serializable summary of a [`Halted`] plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaltReport {
    /// 1-based position of the failing step.
    pub index: usize,
    /// Label of the failing step.
    pub step: String,
    /// Rendered cause.
    pub error: String,
    /// Exit code of a failed command, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Captured stdout of a failed command.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    /// Captured stderr of a failed command.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl Halted {
    /// Flattens the failure for display or JSON output.
    pub fn report(&self) -> HaltReport {
        let (exit_code, stdout, stderr) = match &self.cause {
            StepError::CommandFailed {
                exit_code,
                stdout,
                stderr,
                ..
            } => (*exit_code, stdout.clone(), stderr.clone()),
            _ => (None, String::new(), String::new()),
        };
        HaltReport {
            index: self.index,
            step: self.step.clone(),
            error: self.cause.to_string(),
            exit_code,
            stdout,
            stderr,
        }
    }
}

// ──────────────────────────────────────────────
// Events and results
// ──────────────────────────────────────────────

/// Outcome of a single step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepOutcome {
    /// The step did its work.
    Success {
        /// Description of what happened.
        message: String,
    },
    /// The step had nothing to do, or only reported in a dry run.
    Skipped {
        /// Why nothing happened.
        reason: String,
    },
    /// `analyze` found nothing to release; the plan stops here.
    NoRelease {
        /// Why there is no release.
        reason: String,
    },
    /// A best-effort step failed; the plan continued.
    Failed {
        /// The error message.
        error: String,
    },
}

/// A finished step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// 1-based position in the plan.
    pub index: usize,
    /// Step label.
    pub step: String,
    /// What happened.
    pub outcome: StepOutcome,
}

/// Progress notifications for the CLI.
#[derive(Debug, Clone)]
pub enum StepEvent {
    /// A step is about to run.
    Started {
        /// 1-based position in the plan.
        index: usize,
        /// Step label.
        step: String,
    },
    /// A step finished.
    Completed(StepRecord),
}

/// Result of a plan that ran to completion (or stopped on no release).
#[derive(Debug, Clone, Serialize)]
pub struct PublicationResult {
    /// Whether a version was released.
    pub released: bool,
    /// Every step that ran, in order.
    pub steps: Vec<StepRecord>,
}

// ──────────────────────────────────────────────
// Execution
// ──────────────────────────────────────────────

/// Collaborators and settings shared by all steps.
pub struct StepEnv<'a> {
    /// Project root; commands run and paths resolve here.
    pub root: &'a Utf8Path,
    /// Runs shell commands.
    pub shell: &'a dyn Shell,
    /// Commits, tags and pushes.
    pub vcs: &'a dyn Vcs,
    /// Release rules for `analyze`.
    pub rules: &'a [ReleaseRule],
    /// Notes layout for `generate-notes`.
    pub notes: &'a [NotesSection],
    /// Remote to push to.
    pub remote: &'a str,
    /// Never push, whatever the steps say.
    pub no_push: bool,
}

/// Run `plan` step by step over `ctx`.
#[instrument(skip_all, fields(steps = plan.len(), dry_run = ctx.dry_run))]
pub fn execute(
    plan: &[StepSpec],
    ctx: &mut PipelineContext,
    env: &StepEnv<'_>,
    mut on_event: impl FnMut(StepEvent),
) -> Result<PublicationResult, Halted> {
    let mut completed = Vec::with_capacity(plan.len());

    for (position, spec) in plan.iter().enumerate() {
        let index = position + 1;
        let step = spec.kind.label();
        on_event(StepEvent::Started {
            index,
            step: step.clone(),
        });
        debug!(index, %step, "step started");

        let outcome = match run_step(&spec.kind, ctx, env) {
            Ok(outcome) => outcome,
            Err(cause) if spec.best_effort => {
                warn!(index, %step, error = %cause, "best-effort step failed, continuing");
                StepOutcome::Failed {
                    error: cause.to_string(),
                }
            }
            Err(cause) => {
                if let StepError::CommandFailed { stderr, .. } = &cause {
                    error!(index, %step, error = %cause, %stderr, "step failed, halting plan");
                } else {
                    error!(index, %step, error = %cause, "step failed, halting plan");
                }
                return Err(Halted {
                    index,
                    step,
                    cause,
                    completed,
                });
            }
        };

        let stop = matches!(outcome, StepOutcome::NoRelease { .. });
        let record = StepRecord {
            index,
            step,
            outcome,
        };
        on_event(StepEvent::Completed(record.clone()));
        completed.push(record);

        if stop {
            info!("nothing to release");
            return Ok(PublicationResult {
                released: false,
                steps: completed,
            });
        }
    }

    let released = ctx.version.is_some() && !ctx.dry_run;
    info!(released, version = ?ctx.version, "plan finished");
    Ok(PublicationResult {
        released,
        steps: completed,
    })
}

fn run_step(kind: &StepKind, ctx: &mut PipelineContext, env: &StepEnv<'_>) -> StepResult<StepOutcome> {
    match kind {
        StepKind::Analyze => analyze(ctx, env),
        StepKind::GenerateNotes => generate_notes(ctx, env),
        StepKind::Changelog { path, title } => write_changelog(ctx, env, path, title.as_deref()),
        StepKind::Package { path } => bump_package(ctx, env, path),
        StepKind::Exec { command, .. } => run_command(ctx, env, command),
        StepKind::Git {
            assets,
            message,
            push,
        } => commit_assets(ctx, env, assets.as_deref(), message, *push),
        StepKind::Tag { push } => tag_release(ctx, env, *push),
        StepKind::PublishNotes { command } => publish_notes(ctx, env, command),
    }
}

fn require<'c>(
    value: Option<&'c String>,
    step: &'static str,
    field: &'static str,
) -> StepResult<&'c str> {
    value
        .map(String::as_str)
        .ok_or(StepError::MissingContext { step, field })
}

fn dry_run(action: String) -> StepResult<StepOutcome> {
    Ok(StepOutcome::Skipped {
        reason: format!("dry run: would {action}"),
    })
}

fn analyze(ctx: &mut PipelineContext, env: &StepEnv<'_>) -> StepResult<StepOutcome> {
    let release = rules::decide(env.rules, ctx.commits.iter().map(|c| &c.message));
    let initial = parse_version(&ctx.initial_version)?;
    let previous = ctx
        .previous_version
        .as_deref()
        .map(parse_version)
        .transpose()?;

    let next = version::release_version(previous.as_ref(), release, &initial);
    ctx.record_analysis(release, next.as_ref());

    match next {
        None => Ok(StepOutcome::NoRelease {
            reason: format!(
                "{} commit(s) since {}, none trigger a release",
                ctx.commits.len(),
                ctx.previous_tag.as_deref().unwrap_or("the first commit")
            ),
        }),
        Some(next) => Ok(StepOutcome::Success {
            message: match previous {
                Some(previous) => format!("{release} release: {previous} → {next}"),
                None => format!("first release: {next}"),
            },
        }),
    }
}

fn generate_notes(ctx: &mut PipelineContext, env: &StepEnv<'_>) -> StepResult<StepOutcome> {
    let version = require(ctx.version.as_ref(), "generate-notes", "version")?;
    let tag = require(ctx.tag.as_ref(), "generate-notes", "tag")?;
    let header = NotesHeader {
        version,
        tag,
        previous_tag: ctx.previous_tag.as_deref(),
        date: &ctx.date,
        release_type: ctx.release_type.unwrap_or(ReleaseType::Patch),
        repo_url: ctx.repo_url.as_deref(),
    };
    let rendered = notes::render(&header, &ctx.commits, env.notes);
    let lines = rendered.lines().count();
    ctx.record_notes(rendered);
    Ok(StepOutcome::Success {
        message: format!("{lines} line(s) of release notes"),
    })
}

fn write_changelog(
    ctx: &mut PipelineContext,
    env: &StepEnv<'_>,
    path: &str,
    title: Option<&str>,
) -> StepResult<StepOutcome> {
    if path.trim().is_empty() {
        return Ok(StepOutcome::Skipped {
            reason: "no changelog path".into(),
        });
    }
    let notes = require(ctx.notes.as_ref(), "changelog", "notes")?;
    if ctx.dry_run {
        return dry_run(format!("prepend release notes to {path}"));
    }

    let changed = changelog::prepend(&env.root.join(path), notes, title)?;
    ctx.record_asset(path);
    if changed {
        Ok(StepOutcome::Success {
            message: format!("updated {path}"),
        })
    } else {
        Ok(StepOutcome::Skipped {
            reason: format!("{path} already has this release"),
        })
    }
}

fn bump_package(ctx: &mut PipelineContext, env: &StepEnv<'_>, path: &str) -> StepResult<StepOutcome> {
    if path.trim().is_empty() {
        return Ok(StepOutcome::Skipped {
            reason: "no manifest path".into(),
        });
    }
    let version = require(ctx.version.as_ref(), "package", "version")?.to_string();
    if ctx.dry_run {
        return dry_run(format!("set version {version} in {path}"));
    }

    let changed = package::set_version(&env.root.join(path), &version)?;
    ctx.record_asset(path);
    if changed {
        Ok(StepOutcome::Success {
            message: format!("{path} set to {version}"),
        })
    } else {
        Ok(StepOutcome::Skipped {
            reason: format!("{path} already at {version}"),
        })
    }
}

fn run_command(ctx: &mut PipelineContext, env: &StepEnv<'_>, template: &str) -> StepResult<StepOutcome> {
    if template.trim().is_empty() {
        return Ok(StepOutcome::Skipped {
            reason: "empty command".into(),
        });
    }
    let command = interpolate(template, &ctx.vars());
    if ctx.dry_run {
        return dry_run(format!("run `{command}`"));
    }

    shell_out(env, &command)?;
    Ok(StepOutcome::Success {
        message: format!("ran `{command}`"),
    })
}

/// Run a command, turning a non-zero exit into [`StepError::CommandFailed`].
fn shell_out(env: &StepEnv<'_>, command: &str) -> StepResult<String> {
    let output = env.shell.run(command, env.root)?;
    if !output.success() {
        return Err(StepError::CommandFailed {
            command: command.to_string(),
            exit_code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    debug!(stdout = %output.stdout.trim(), "command succeeded");
    Ok(output.stdout)
}

fn commit_assets(
    ctx: &mut PipelineContext,
    env: &StepEnv<'_>,
    assets: Option<&[String]>,
    template: &str,
    push: bool,
) -> StepResult<StepOutcome> {
    let assets = assets.map_or_else(|| ctx.assets.clone(), <[String]>::to_vec);
    if assets.is_empty() {
        return Ok(StepOutcome::Skipped {
            reason: "no assets to commit".into(),
        });
    }
    require(ctx.version.as_ref(), "git", "version")?;
    let push = push && !env.no_push;
    let branch = if push {
        Some(require(ctx.branch.as_ref(), "git", "branch")?.to_string())
    } else {
        None
    };

    let message = interpolate(template, &ctx.vars())
        .replace("{notes}", ctx.notes.as_deref().unwrap_or_default())
        .trim_end()
        .to_string();
    if ctx.dry_run {
        return dry_run(format!("commit {}", assets.join(", ")));
    }

    let hash = env.vcs.commit(&assets, &message)?;
    if let Some(branch) = &branch {
        env.vcs.push_branch(env.remote, branch)?;
    }
    let pushed = branch.map(|b| format!(", pushed to {}/{b}", env.remote));

    let outcome = match &hash {
        Some(hash) => StepOutcome::Success {
            message: format!(
                "committed {} as {}{}",
                assets.join(", "),
                hash.get(..7).unwrap_or(hash),
                pushed.unwrap_or_default()
            ),
        },
        None => StepOutcome::Skipped {
            reason: format!("nothing to commit{}", pushed.unwrap_or_default()),
        },
    };
    if hash.is_some() {
        ctx.record_commit(hash);
    }
    Ok(outcome)
}

fn tag_release(ctx: &mut PipelineContext, env: &StepEnv<'_>, push: bool) -> StepResult<StepOutcome> {
    let tag = require(ctx.tag.as_ref(), "tag", "tag")?.to_string();
    let push = push && !env.no_push;

    let head = env.vcs.head()?;
    let existing = env.vcs.tag_target(&tag)?;
    if let Some(existing) = &existing
        && *existing != head
    {
        return Err(StepError::TagConflict {
            tag,
            existing: existing.clone(),
            head,
        });
    }
    if ctx.dry_run {
        return dry_run(format!("tag {} as {tag}", head.get(..7).unwrap_or(&head)));
    }

    if existing.is_none() {
        env.vcs.create_tag(&tag)?;
    }
    if push {
        env.vcs.push_tag(env.remote, &tag)?;
    }

    let pushed = if push { " and pushed" } else { "" };
    Ok(if existing.is_some() {
        StepOutcome::Skipped {
            reason: format!("{tag} already at HEAD{pushed}"),
        }
    } else {
        StepOutcome::Success {
            message: format!("tagged {tag}{pushed}"),
        }
    })
}

fn publish_notes(ctx: &mut PipelineContext, env: &StepEnv<'_>, template: &str) -> StepResult<StepOutcome> {
    if template.trim().is_empty() {
        return Ok(StepOutcome::Skipped {
            reason: "empty command".into(),
        });
    }
    let notes = require(ctx.notes.as_ref(), "publish-notes", "notes")?;

    let mut file = tempfile::Builder::new()
        .prefix("semrel-notes-")
        .suffix(".md")
        .tempfile()
        .map_err(StepError::NotesFile)?;
    file.write_all(notes.as_bytes())
        .map_err(StepError::NotesFile)?;

    let mut vars = ctx.vars();
    vars.notes_file = file.path().display().to_string();
    let command = interpolate(template, &vars);
    if ctx.dry_run {
        return dry_run(format!("run `{command}`"));
    }

    let stdout = shell_out(env, &command)?;
    let url = stdout
        .lines()
        .map(str::trim)
        .rfind(|line| line.starts_with("https://") || line.starts_with("http://"))
        .map(String::from);
    let message = url
        .as_deref()
        .map_or_else(|| format!("ran `{command}`"), |url| format!("published {url}"));
    ctx.record_release(url);
    Ok(StepOutcome::Success { message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    use camino::Utf8PathBuf;
    use semver::Version;
    use tempfile::TempDir;

    use crate::commit::{ClassifiedCommit, classify};
    use crate::config::{LintConfig, NotesConfig};
    use crate::exec::{CommandOutput, ExecResult};
    use crate::git::GitResult;
    use crate::pipeline::PipelineContextInit;

    /// Records commands; a command containing a key of `exit_codes` exits with that code.
    #[derive(Default)]
    struct FakeShell {
        exit_codes: HashMap<&'static str, i32>,
        stdout: String,
        ran: RefCell<Vec<String>>,
    }

    impl Shell for FakeShell {
        fn run(&self, command: &str, _cwd: &Utf8Path) -> ExecResult<CommandOutput> {
            self.ran.borrow_mut().push(command.to_string());
            let code = self
                .exit_codes
                .iter()
                .find(|(needle, _)| command.contains(**needle))
                .map_or(0, |(_, code)| *code);
            Ok(CommandOutput {
                code: Some(code),
                stdout: self.stdout.clone(),
                stderr: if code == 0 { String::new() } else { "boom".into() },
                duration: std::time::Duration::ZERO,
            })
        }
    }

    struct FakeVcs {
        head: RefCell<String>,
        tags: RefCell<HashMap<String, String>>,
        commits: RefCell<Vec<(Vec<String>, String)>>,
        pushes: RefCell<Vec<String>>,
    }

    impl FakeVcs {
        fn new() -> Self {
            Self {
                head: RefCell::new("0000000000000000".into()),
                tags: RefCell::new(HashMap::new()),
                commits: RefCell::new(Vec::new()),
                pushes: RefCell::new(Vec::new()),
            }
        }
    }

    impl Vcs for FakeVcs {
        fn head(&self) -> GitResult<String> {
            Ok(self.head.borrow().clone())
        }

        fn tag_target(&self, tag: &str) -> GitResult<Option<String>> {
            Ok(self.tags.borrow().get(tag).cloned())
        }

        fn commit(&self, paths: &[String], message: &str) -> GitResult<Option<String>> {
            let mut commits = self.commits.borrow_mut();
            commits.push((paths.to_vec(), message.to_string()));
            let hash = format!("{:016}", commits.len());
            *self.head.borrow_mut() = hash.clone();
            Ok(Some(hash))
        }

        fn create_tag(&self, tag: &str) -> GitResult<()> {
            let head = self.head.borrow().clone();
            self.tags.borrow_mut().insert(tag.to_string(), head);
            Ok(())
        }

        fn push_branch(&self, remote: &str, branch: &str) -> GitResult<()> {
            self.pushes.borrow_mut().push(format!("{remote} {branch}"));
            Ok(())
        }

        fn push_tag(&self, remote: &str, tag: &str) -> GitResult<()> {
            self.pushes.borrow_mut().push(format!("{remote} {tag}"));
            Ok(())
        }
    }

    struct Fixture {
        _tmp: TempDir,
        root: Utf8PathBuf,
        rules: Vec<ReleaseRule>,
        sections: Vec<NotesSection>,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
            Self {
                _tmp: tmp,
                root,
                rules: rules::default_rules(),
                sections: NotesConfig::default().sections,
            }
        }

        fn env<'a>(&'a self, shell: &'a dyn Shell, vcs: &'a dyn Vcs) -> StepEnv<'a> {
            StepEnv {
                root: &self.root,
                shell,
                vcs,
                rules: &self.rules,
                notes: &self.sections,
                remote: "origin",
                no_push: false,
            }
        }
    }

    fn context(messages: &[&str]) -> PipelineContext {
        let commits = messages
            .iter()
            .enumerate()
            .map(|(i, raw)| ClassifiedCommit {
                hash: format!("{i:040}"),
                message: classify(raw, &LintConfig::default()).unwrap(),
            })
            .collect();
        PipelineContext::new(PipelineContextInit {
            previous_version: Some(Version::new(1, 1, 0)),
            previous_tag: Some("v1.1.0".into()),
            tag_format: "v{version}".into(),
            initial_version: Version::new(1, 0, 0),
            owner: "o".into(),
            repo: "r".into(),
            repo_url: None,
            branch: Some("main".into()),
            commits,
            dry_run: false,
        })
    }

    fn exec(command: &str) -> StepSpec {
        StepSpec::new(StepKind::Exec {
            command: command.into(),
            name: None,
        })
    }

    #[test]
    fn failing_step_halts_the_rest() {
        let fx = Fixture::new();
        let shell = FakeShell {
            exit_codes: HashMap::from([("step-two", 2)]),
            ..FakeShell::default()
        };
        let vcs = FakeVcs::new();
        let plan = vec![
            StepSpec::new(StepKind::Analyze),
            exec("echo step-two {version}"),
            exec("echo step-three"),
            exec("echo step-four"),
        ];
        let mut ctx = context(&["feat: a"]);

        let mut started = Vec::new();
        let halted = execute(&plan, &mut ctx, &fx.env(&shell, &vcs), |event| {
            if let StepEvent::Started { index, .. } = event {
                started.push(index);
            }
        })
        .unwrap_err();

        assert_eq!(halted.index, 2);
        assert_eq!(halted.step, "exec `echo step-two {version}`");
        assert_eq!(halted.completed.len(), 1);
        match &halted.cause {
            StepError::CommandFailed {
                command,
                exit_code,
                stderr,
                ..
            } => {
                assert_eq!(command, "echo step-two 1.2.0");
                assert_eq!(*exit_code, Some(2));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected cause: {other:?}"),
        }
        assert_eq!(started, vec![1, 2]);
        assert_eq!(shell.ran.borrow().len(), 1);

        let report = halted.report();
        assert_eq!(report.index, 2);
        assert_eq!(report.exit_code, Some(2));
        assert_eq!(report.stderr, "boom");
        assert!(report.error.contains("echo step-two 1.2.0"));
    }

    #[test]
    fn best_effort_failure_continues() {
        let fx = Fixture::new();
        let shell = FakeShell {
            exit_codes: HashMap::from([("docker", 1)]),
            ..FakeShell::default()
        };
        let vcs = FakeVcs::new();
        let plan = vec![
            StepSpec::new(StepKind::Analyze),
            StepSpec {
                kind: StepKind::Exec {
                    command: "docker push img:{version}".into(),
                    name: Some("docker".into()),
                },
                best_effort: true,
            },
            exec("echo after"),
        ];
        let mut ctx = context(&["fix: a"]);

        let result = execute(&plan, &mut ctx, &fx.env(&shell, &vcs), |_| {}).unwrap();
        assert!(result.released);
        assert!(matches!(result.steps[1].outcome, StepOutcome::Failed { .. }));
        assert_eq!(result.steps[1].step, "docker");
        assert_eq!(shell.ran.borrow().as_slice(), ["docker push img:1.1.1", "echo after"]);
    }

    #[test]
    fn no_release_stops_without_error() {
        let fx = Fixture::new();
        let shell = FakeShell::default();
        let vcs = FakeVcs::new();
        let plan = vec![StepSpec::new(StepKind::Analyze), exec("echo never")];
        let mut ctx = context(&["docs: readme", "chore: deps"]);

        let result = execute(&plan, &mut ctx, &fx.env(&shell, &vcs), |_| {}).unwrap();
        assert!(!result.released);
        assert_eq!(result.steps.len(), 1);
        assert!(matches!(result.steps[0].outcome, StepOutcome::NoRelease { .. }));
        assert!(shell.ran.borrow().is_empty());
        assert_eq!(ctx.release_type, Some(ReleaseType::NoRelease));
    }

    #[test]
    fn empty_command_and_assets_are_noops_that_keep_order() {
        let fx = Fixture::new();
        let shell = FakeShell::default();
        let vcs = FakeVcs::new();
        let plan = vec![
            StepSpec::new(StepKind::Analyze),
            exec("  "),
            StepSpec::new(StepKind::Git {
                assets: Some(Vec::new()),
                message: default_commit_message(),
                push: true,
            }),
            exec("echo last"),
        ];
        let mut ctx = context(&["feat: a"]);

        let result = execute(&plan, &mut ctx, &fx.env(&shell, &vcs), |_| {}).unwrap();
        let indices: Vec<usize> = result.steps.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        assert!(matches!(result.steps[1].outcome, StepOutcome::Skipped { .. }));
        assert!(matches!(result.steps[2].outcome, StepOutcome::Skipped { .. }));
        assert!(vcs.commits.borrow().is_empty());
    }

    #[test]
    fn full_plan_writes_commits_and_tags() {
        let fx = Fixture::new();
        std::fs::write(fx.root.join("package.json"), "{\"version\": \"1.1.0\"}").unwrap();
        let shell = FakeShell::default();
        let vcs = FakeVcs::new();
        let mut plan = default_plan();
        plan.insert(
            3,
            StepSpec::new(StepKind::Package {
                path: default_package_path(),
            }),
        );
        let mut ctx = context(&["feat(cli): add flag", "fix: crash"]);

        let result = execute(&plan, &mut ctx, &fx.env(&shell, &vcs), |_| {}).unwrap();
        assert!(result.released);
        assert_eq!(ctx.version.as_deref(), Some("1.2.0"));
        assert_eq!(ctx.assets, vec!["CHANGELOG.md", "package.json"]);

        let changelog = std::fs::read_to_string(fx.root.join("CHANGELOG.md")).unwrap();
        assert!(changelog.starts_with("# 1.2.0 ("));
        assert!(changelog.contains("* **cli:** add flag"));

        let commits = vcs.commits.borrow();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].0, vec!["CHANGELOG.md", "package.json"]);
        assert!(commits[0].1.starts_with("chore(release): 1.2.0 [skip ci]\n\n# 1.2.0"));

        let head = vcs.head.borrow().clone();
        assert_eq!(vcs.tags.borrow().get("v1.2.0"), Some(&head));
        assert_eq!(ctx.commit_hash.as_deref(), Some(head.as_str()));
        assert_eq!(vcs.pushes.borrow().as_slice(), ["origin main", "origin v1.2.0"]);
    }

    #[test]
    fn rerun_with_tag_at_head_is_noop() {
        let fx = Fixture::new();
        let shell = FakeShell::default();
        let vcs = FakeVcs::new();
        let head = vcs.head.borrow().clone();
        vcs.tags.borrow_mut().insert("v1.2.0".into(), head);

        let plan = vec![
            StepSpec::new(StepKind::Analyze),
            StepSpec::new(StepKind::Tag { push: false }),
        ];
        let mut ctx = context(&["feat: a"]);
        let result = execute(&plan, &mut ctx, &fx.env(&shell, &vcs), |_| {}).unwrap();
        assert!(matches!(result.steps[1].outcome, StepOutcome::Skipped { .. }));
        assert_eq!(vcs.tags.borrow().len(), 1);
    }

    #[test]
    fn rerun_with_tag_elsewhere_fails_loudly() {
        let fx = Fixture::new();
        let shell = FakeShell::default();
        let vcs = FakeVcs::new();
        vcs.tags
            .borrow_mut()
            .insert("v1.2.0".into(), "ffffffffffffffff".into());

        let plan = vec![
            StepSpec::new(StepKind::Analyze),
            StepSpec::new(StepKind::Tag { push: true }),
        ];
        let mut ctx = context(&["feat: a"]);
        let halted = execute(&plan, &mut ctx, &fx.env(&shell, &vcs), |_| {}).unwrap_err();
        assert_eq!(halted.index, 2);
        assert!(matches!(halted.cause, StepError::TagConflict { .. }));
        assert!(vcs.pushes.borrow().is_empty());
    }

    #[test]
    fn steps_before_analyze_miss_context() {
        let fx = Fixture::new();
        let shell = FakeShell::default();
        let vcs = FakeVcs::new();
        let plan = vec![StepSpec::new(StepKind::GenerateNotes)];
        let mut ctx = context(&["feat: a"]);
        let halted = execute(&plan, &mut ctx, &fx.env(&shell, &vcs), |_| {}).unwrap_err();
        assert!(matches!(
            halted.cause,
            StepError::MissingContext {
                step: "generate-notes",
                field: "version"
            }
        ));
    }

    #[test]
    fn dry_run_only_reports_side_effects() {
        let fx = Fixture::new();
        let shell = FakeShell::default();
        let vcs = FakeVcs::new();
        let mut plan = default_plan();
        plan.push(exec("npm publish"));
        let mut ctx = context(&["fix: a"]);
        ctx.dry_run = true;

        let result = execute(&plan, &mut ctx, &fx.env(&shell, &vcs), |_| {}).unwrap();
        assert!(!result.released);
        assert!(ctx.notes.is_some());
        assert!(!fx.root.join("CHANGELOG.md").exists());
        assert!(shell.ran.borrow().is_empty());
        assert!(vcs.commits.borrow().is_empty());
        assert!(vcs.tags.borrow().is_empty());
        for record in &result.steps[2..] {
            assert!(matches!(record.outcome, StepOutcome::Skipped { .. }), "{record:?}");
        }
    }

    #[test]
    fn no_push_overrides_steps() {
        let fx = Fixture::new();
        let shell = FakeShell::default();
        let vcs = FakeVcs::new();
        let mut env = fx.env(&shell, &vcs);
        env.no_push = true;
        let mut ctx = context(&["fix: a"]);

        execute(&default_plan(), &mut ctx, &env, |_| {}).unwrap();
        assert!(vcs.pushes.borrow().is_empty());
        assert_eq!(vcs.tags.borrow().len(), 1);
    }

    #[test]
    fn publish_notes_passes_notes_file_and_records_url() {
        let fx = Fixture::new();
        let shell = FakeShell {
            stdout: "created\nhttps://github.com/o/r/releases/tag/v1.1.1\n".into(),
            ..FakeShell::default()
        };
        let vcs = FakeVcs::new();
        let plan = vec![
            StepSpec::new(StepKind::Analyze),
            StepSpec::new(StepKind::GenerateNotes),
            StepSpec::new(StepKind::PublishNotes {
                command: "gh release create {tag} --notes-file {notes_file}".into(),
            }),
        ];
        let mut ctx = context(&["fix: a"]);

        execute(&plan, &mut ctx, &fx.env(&shell, &vcs), |_| {}).unwrap();
        let ran = shell.ran.borrow();
        assert!(ran[0].starts_with("gh release create v1.1.1 --notes-file "));
        assert!(ran[0].ends_with(".md"));
        assert_eq!(
            ctx.release_url.as_deref(),
            Some("https://github.com/o/r/releases/tag/v1.1.1")
        );
    }

    #[test]
    fn first_release_uses_initial_version() {
        let fx = Fixture::new();
        let shell = FakeShell::default();
        let vcs = FakeVcs::new();
        let mut ctx = context(&["feat!: everything"]);
        ctx.previous_version = None;
        ctx.previous_tag = None;

        execute(
            &[StepSpec::new(StepKind::Analyze)],
            &mut ctx,
            &fx.env(&shell, &vcs),
            |_| {},
        )
        .unwrap();
        assert_eq!(ctx.version.as_deref(), Some("1.0.0"));
        assert_eq!(ctx.tag.as_deref(), Some("v1.0.0"));
    }

    #[test]
    fn step_spec_wire_shape() {
        let plan: Vec<StepSpec> = serde_json::from_value(serde_json::json!([
            { "step": "analyze" },
            { "step": "exec", "command": "make", "best_effort": true },
            { "step": "git", "assets": ["CHANGELOG.md"], "push": false },
            { "step": "publish-notes", "command": "gh release create {tag}" }
        ]))
        .unwrap();
        assert_eq!(plan[0], StepSpec::new(StepKind::Analyze));
        assert!(plan[1].best_effort);
        assert!(matches!(
            &plan[2].kind,
            StepKind::Git { assets: Some(a), push: false, message } if a.len() == 1 && message == DEFAULT_COMMIT_MESSAGE
        ));
        assert_eq!(plan[3].kind.key(), "publish-notes");
    }
}
