//! Lint command: check commit messages against the configured rules.
//!
//! Doubles as a `commit-msg` hook:
//!
//! ```sh
//! semrel lint --edit "$1"
//! ```

use std::io::{IsTerminal, Read};

use anyhow::{Context, bail};
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use semrel_core::commit::{self, LintWarning, Rejection};
use semrel_core::config::{Config, LintConfig};
use semrel_core::git;

/// Arguments for the `lint` subcommand.
#[derive(Args, Debug, Default)]
pub struct LintArgs {
    /// Message to check (reads stdin when no source is given)
    #[arg(short, long, value_name = "MSG", conflicts_with_all = ["edit", "from"])]
    pub message: Option<String>,

    /// Check a commit message file, as written by git for the commit-msg hook
    #[arg(
        long,
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = ".git/COMMIT_EDITMSG",
        conflicts_with = "from"
    )]
    pub edit: Option<camino::Utf8PathBuf>,

    /// Check every commit after this revision
    #[arg(long, value_name = "REV")]
    pub from: Option<String>,

    /// Last revision to check with --from
    #[arg(long, value_name = "REV", default_value = "HEAD", requires = "from")]
    pub to: String,
}

/// Verdict for one message.
#[derive(Debug, Serialize)]
pub struct LintResult {
    /// Commit hash, file path, or `stdin`.
    pub source: String,
    /// First line of the message.
    pub header: String,
    /// Whether the message passed (ignored messages pass).
    pub valid: bool,
    /// Skipped as a merge, fixup or revert commit.
    pub ignored: bool,
    /// Why it failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
    /// Non-fatal findings.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<LintWarning>,
}

/// Check a single message.
pub fn lint_message(source: String, raw: &str, lint: &LintConfig) -> LintResult {
    let header = raw.trim_start().lines().next().unwrap_or_default().to_string();

    if lint.default_ignores && commit::is_ignored(raw) {
        debug!(%source, "ignored message");
        return LintResult {
            source,
            header,
            valid: true,
            ignored: true,
            rejection: None,
            warnings: Vec::new(),
        };
    }

    match commit::classify(raw, lint) {
        Ok(message) => LintResult {
            source,
            header,
            valid: true,
            ignored: false,
            rejection: None,
            warnings: message.warnings,
        },
        Err(rejection) => {
            warn!(%source, %header, reason = %rejection, "rejected message");
            LintResult {
                source,
                header,
                valid: false,
                ignored: false,
                rejection: Some(rejection),
                warnings: Vec::new(),
            }
        }
    }
}

fn collect_messages(args: &LintArgs, cwd: &camino::Utf8Path) -> anyhow::Result<Vec<(String, String)>> {
    if let Some(message) = &args.message {
        return Ok(vec![("message".into(), message.clone())]);
    }

    if let Some(path) = &args.edit {
        let path = if path.is_absolute() {
            path.clone()
        } else {
            cwd.join(path)
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read commit message from {path}"))?;
        return Ok(vec![(path.to_string(), commit::strip_comments(&raw))]);
    }

    if let Some(from) = &args.from {
        let commits = git::commits_between(cwd, Some(from), &args.to)
            .with_context(|| format!("failed to read commits {from}..{}", args.to))?;
        return Ok(commits.into_iter().map(|c| (c.hash, c.message)).collect());
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        bail!("no commit message given; pass --message, --edit, --from or pipe one on stdin");
    }
    let mut raw = String::new();
    stdin
        .lock()
        .read_to_string(&mut raw)
        .context("failed to read commit message from stdin")?;
    Ok(vec![("stdin".into(), raw)])
}

/// Execute the lint command.
#[instrument(name = "cmd_lint", skip_all)]
pub fn cmd_lint(
    args: LintArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    let messages = collect_messages(&args, cwd)?;
    debug!(count = messages.len(), "linting commit messages");

    let results: Vec<LintResult> = messages
        .into_iter()
        .map(|(source, raw)| lint_message(source, &raw, &config.lint))
        .collect();

    if global_json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            print_result(result);
        }
    }

    let failed = results.iter().filter(|r| !r.valid).count();
    if failed > 0 {
        bail!("{failed} of {} commit message(s) rejected", results.len());
    }
    Ok(())
}

fn print_result(result: &LintResult) {
    let source = result.source.get(..7).filter(|_| result.source.len() == 40);
    let source = source.unwrap_or(&result.source);

    if result.ignored {
        println!("{} {} {}", "–".yellow(), source.dimmed(), "ignored".dimmed());
        return;
    }
    match &result.rejection {
        Some(rejection) => {
            println!("{} {} {}", "✗".red(), source.dimmed(), result.header);
            println!("    {}", rejection.to_string().red());
        }
        None => println!("{} {} {}", "✓".green(), source.dimmed(), result.header),
    }
    for warning in &result.warnings {
        println!("    {} {warning}", "⚠".yellow());
    }
}
