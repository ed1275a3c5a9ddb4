//! Analyze command: classify unreleased commits and report the decision.

use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use semrel_core::config::Config;
use semrel_core::release::{AcceptedCommit, Analysis};
use semrel_core::version::ReleaseType;

/// Arguments for the `analyze` subcommand.
#[derive(Args, Debug, Default)]
pub struct AnalyzeArgs {
    /// Exit non-zero when there is nothing to release
    #[arg(long)]
    pub strict: bool,
}

#[derive(Serialize)]
struct AnalyzeReport<'a> {
    previous_tag: Option<&'a str>,
    previous_version: Option<String>,
    next_version: Option<String>,
    next_tag: Option<&'a str>,
    #[serde(flatten)]
    analysis: &'a Analysis,
}

/// Execute the analyze command.
#[instrument(name = "cmd_analyze", skip_all)]
pub fn cmd_analyze(
    args: AnalyzeArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    debug!(json_output = global_json, "executing analyze command");
    let ready = super::plan_for_report(config, cwd)?;

    if global_json {
        let report = AnalyzeReport {
            previous_tag: ready.previous.as_ref().map(|(t, _)| t.as_str()),
            previous_version: ready.previous.as_ref().map(|(_, v)| v.to_string()),
            next_version: ready.next_version.as_ref().map(ToString::to_string),
            next_tag: ready.next_tag.as_deref(),
            analysis: &ready.analysis,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let since = ready
            .previous
            .as_ref()
            .map_or("the first commit", |(t, _)| t.as_str());
        println!("{} since {}", "Commits".bold().underline(), since.cyan());
        println!();

        if ready.analysis.accepted.is_empty() && ready.analysis.rejected.is_empty() {
            println!("  {} No commits to analyze", "○".dimmed());
        }
        for accepted in &ready.analysis.accepted {
            print_accepted(accepted);
        }
        super::print_rejections(&ready.analysis.rejected);
        if !ready.analysis.ignored.is_empty() {
            println!(
                "  {} {}",
                "–".yellow(),
                format!("{} merge/fixup/revert commit(s) ignored", ready.analysis.ignored.len())
                    .dimmed()
            );
        }

        println!();
        match (&ready.next_version, &ready.previous) {
            (Some(next), Some((_, previous))) => println!(
                "{}: {} {} → {}",
                "Decision".bold(),
                ready.analysis.release.to_string().cyan(),
                previous.to_string().dimmed(),
                next.to_string().green().bold(),
            ),
            (Some(next), None) => println!(
                "{}: first release {}",
                "Decision".bold(),
                next.to_string().green().bold(),
            ),
            (None, _) => println!("{}: {}", "Decision".bold(), "no release".yellow()),
        }
    }

    if args.strict && !ready.is_release() {
        anyhow::bail!("no release-worthy commits");
    }
    Ok(())
}

fn print_accepted(accepted: &AcceptedCommit) {
    let release = match accepted.release {
        ReleaseType::NoRelease => "·".dimmed().to_string(),
        other => other.to_string().cyan().to_string(),
    };
    let breaking = if accepted.commit.message.breaking {
        " BREAKING".red().bold().to_string()
    } else {
        String::new()
    };
    println!(
        "  {} {} {}{breaking}  {release}",
        "✓".green(),
        accepted.commit.short_hash().dimmed(),
        accepted.commit.message.header(),
    );
}
