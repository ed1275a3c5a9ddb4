//! Command implementations

pub mod analyze;

pub mod doctor;

pub mod info;

pub mod lint;

pub mod notes;

pub mod preflight;

pub mod release;

use anyhow::Context;
use owo_colors::OwoColorize;

use semrel_core::config::Config;
use semrel_core::release::{ReadyRelease, RejectedCommit, ReleaseOptions, plan_release};

/// Plan a release for read-only commands (`analyze`, `notes`).
///
/// The release branch check is skipped; these commands only report.
pub fn plan_for_report(config: &Config, cwd: &camino::Utf8Path) -> anyhow::Result<ReadyRelease> {
    let options = ReleaseOptions {
        dry_run: true,
        any_branch: true,
        ..ReleaseOptions::default()
    };
    plan_release(cwd, config, options).context("failed to analyze commits")
}

/// Print rejected commits, one per line.
pub fn print_rejections(rejected: &[RejectedCommit]) {
    for commit in rejected {
        println!(
            "  {} {} {}",
            "✗".red(),
            commit.hash.get(..7).unwrap_or(&commit.hash).dimmed(),
            commit.header,
        );
        println!("      {}", commit.reason.to_string().red());
    }
}
