//! Preflight checks for release readiness.
//!
//! Validates the git state, branch, remote sync, configuration and tool
//! availability before a release. Returns structured results that the CLI
//! formats.

use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::git;
use crate::plan::StepKind;

/// A single preflight check result.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Human-readable name of the check.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Description of the result (reason for failure, or confirmation).
    pub message: String,
}

impl CheckResult {
    fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
        }
    }

    fn fail(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
        }
    }
}

/// Full preflight report.
#[derive(Debug, Clone, Serialize)]
pub struct PreflightReport {
    /// Individual check results.
    pub checks: Vec<CheckResult>,
    /// Whether all checks passed.
    pub all_passed: bool,
}

/// Run all preflight checks.
#[instrument(skip(config), fields(root = %project_root))]
pub fn run_preflight(project_root: &Utf8Path, config: &Config) -> PreflightReport {
    let mut checks = vec![check_config(config)];

    let in_repo = check_git_repo(project_root);
    let is_repo = in_repo.passed;
    checks.push(in_repo);

    if is_repo {
        checks.push(check_clean_tree(project_root));
        checks.push(check_release_branch(project_root, &config.release.branches));
        checks.push(check_remote_sync(project_root));
    }

    checks.push(check_required_tools(config));

    let all_passed = checks.iter().all(|c| c.passed);
    debug!(all_passed, check_count = checks.len(), "preflight complete");

    PreflightReport { checks, all_passed }
}

fn check_config(config: &Config) -> CheckResult {
    const NAME: &str = "Configuration";
    match config.validate() {
        Ok(()) => CheckResult::pass(
            NAME,
            format!(
                "{} release rule(s), {} step(s)",
                config.release.rules.len(),
                config.plan().len()
            ),
        ),
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

fn check_git_repo(root: &Utf8Path) -> CheckResult {
    const NAME: &str = "Git repository";
    match git::is_inside_repo(root) {
        Ok(true) => CheckResult::pass(NAME, "Inside a git repository"),
        Ok(false) => CheckResult::fail(NAME, "Not inside a git repository"),
        Err(e) => CheckResult::fail(NAME, format!("Failed to check: {e}")),
    }
}

fn check_clean_tree(root: &Utf8Path) -> CheckResult {
    const NAME: &str = "Working tree";
    match git::is_clean(root) {
        Ok(true) => CheckResult::pass(NAME, "Clean working tree"),
        Ok(false) => CheckResult::fail(NAME, "Uncommitted changes in working tree"),
        Err(e) => CheckResult::fail(NAME, format!("Failed to check: {e}")),
    }
}

fn check_release_branch(root: &Utf8Path, allowed: &[String]) -> CheckResult {
    const NAME: &str = "Release branch";
    match git::current_branch(root) {
        Ok(Some(current)) => branch_result(&current, allowed),
        Ok(None) => CheckResult::fail(NAME, "Detached HEAD, not on any branch"),
        Err(e) => CheckResult::fail(NAME, format!("Failed to check: {e}")),
    }
}

fn branch_result(current: &str, allowed: &[String]) -> CheckResult {
    const NAME: &str = "Release branch";
    if allowed.iter().any(|b| b == current) {
        CheckResult::pass(NAME, format!("On release branch '{current}'"))
    } else {
        CheckResult::fail(
            NAME,
            format!("On '{current}', releases happen from: {}", allowed.join(", ")),
        )
    }
}

fn check_remote_sync(root: &Utf8Path) -> CheckResult {
    const NAME: &str = "Remote sync";
    match git::is_remote_in_sync(root) {
        Ok(true) => CheckResult::pass(NAME, "Local branch is in sync with remote"),
        Ok(false) => CheckResult::fail(
            NAME,
            "Local branch is out of sync with remote (pull or push needed)",
        ),
        Err(e) => CheckResult::fail(NAME, format!("Failed to check: {e}")),
    }
}

/// Programs the configured plan needs on `PATH`.
pub fn required_tools(config: &Config) -> Vec<String> {
    let mut tools = vec!["git".to_string(), "sh".to_string()];
    for spec in config.plan() {
        let command = match &spec.kind {
            StepKind::Exec { command, .. } | StepKind::PublishNotes { command } => command,
            _ => continue,
        };
        if let Some(bin) = command.split_whitespace().next()
            && !bin.contains('{')
            && !tools.iter().any(|t| t == bin)
        {
            tools.push(bin.to_string());
        }
    }
    tools
}

fn check_required_tools(config: &Config) -> CheckResult {
    const NAME: &str = "Required tools";
    let missing: Vec<String> = required_tools(config)
        .into_iter()
        .filter(|bin| which::which(bin).is_err())
        .collect();

    if missing.is_empty() {
        CheckResult::pass(NAME, "All required tools are installed")
    } else {
        CheckResult::fail(NAME, format!("Missing tools: {}", missing.join(", ")))
    }
}
