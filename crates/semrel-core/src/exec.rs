//! External command execution.
//!
//! Publication steps that talk to registries and hosting services run
//! user-configured shell commands. Templates support `{var}` interpolation:
//! `{version}`, `{prev_version}`, `{tag}`, `{prev_tag}`, `{release_type}`,
//! `{owner}`, `{repo}`, `{branch}` and `{notes_file}`. Unknown placeholders
//! are left untouched.
//!
//! Commands run through `sh -c` in the project root, blocking until they
//! exit, with stdout and stderr captured.

use std::process::Command;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from command execution.
#[derive(Error, Debug)]
pub enum ExecError {
    /// Failed to spawn the shell.
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        /// The command that could not be started.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Result alias for command execution.
pub type ExecResult<T> = Result<T, ExecError>;

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Wall-clock run time.
    pub duration: Duration,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Runs shell commands.
pub trait Shell {
    /// Run `command` in `cwd` and wait for it to exit.
    ///
    /// A non-zero exit is not an error at this level; callers inspect
    /// [`CommandOutput::code`].
    fn run(&self, command: &str, cwd: &Utf8Path) -> ExecResult<CommandOutput>;
}

/// [`Shell`] that runs commands through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl Shell for SystemShell {
    #[instrument(skip(self), fields(%cwd))]
    fn run(&self, command: &str, cwd: &Utf8Path) -> ExecResult<CommandOutput> {
        debug!("running command");
        let start = Instant::now();
        let output = Command::new("sh")
            .args(["-c", command])
            .current_dir(cwd.as_std_path())
            .output()
            .map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                source,
            })?;
        let duration = start.elapsed();

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration,
        };
        debug!(code = ?result.code, ?duration, "command finished");
        Ok(result)
    }
}

/// Values available to command templates.
///
/// Derived from [`PipelineContext::vars()`](crate::pipeline::PipelineContext::vars).
/// Values that are not known yet interpolate as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandVars {
    /// The new version (e.g., `1.2.3`).
    pub version: String,
    /// The previous version.
    pub prev_version: String,
    /// The tag for this release.
    pub tag: String,
    /// The tag of the previous release.
    pub prev_tag: String,
    /// `major`, `minor`, `patch` or `no-release`.
    pub release_type: String,
    /// Repository owner (from git remote).
    pub owner: String,
    /// Repository name (from git remote).
    pub repo: String,
    /// Branch being released.
    pub branch: String,
    /// Path of a file holding the release notes, when one was written.
    pub notes_file: String,
}

/// Replace `{var}` placeholders with values from `vars`.
pub fn interpolate(template: &str, vars: &CommandVars) -> String {
    template
        .replace("{version}", &vars.version)
        .replace("{prev_version}", &vars.prev_version)
        .replace("{tag}", &vars.tag)
        .replace("{prev_tag}", &vars.prev_tag)
        .replace("{release_type}", &vars.release_type)
        .replace("{owner}", &vars.owner)
        .replace("{repo}", &vars.repo)
        .replace("{branch}", &vars.branch)
        .replace("{notes_file}", &vars.notes_file)
}
