//! Release command: thin CLI layer over `semrel_core::release`.

use std::cell::RefCell;
use std::io::IsTerminal;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use semrel_core::config::Config;
use semrel_core::exec::SystemShell;
use semrel_core::git::SystemGit;
use semrel_core::plan::{StepEvent, StepOutcome, StepRecord};
use semrel_core::release::{self, ReadyRelease, ReleaseError, ReleaseOptions};

/// Arguments for the `release` subcommand.
#[derive(Args, Debug, Default)]
pub struct ReleaseArgs {
    /// Preview what would happen without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Skip git push (still commits and tags locally)
    #[arg(long)]
    pub no_push: bool,

    /// Release from any branch, not only the configured release branches
    #[arg(long)]
    pub any_branch: bool,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Execute the release command.
#[instrument(name = "cmd_release", skip_all)]
pub fn cmd_release(
    args: ReleaseArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    debug!(
        json_output = global_json,
        dry_run = args.dry_run,
        "executing release command"
    );

    let options = ReleaseOptions {
        dry_run: args.dry_run,
        no_push: args.no_push,
        any_branch: args.any_branch,
    };
    let is_dry = options.dry_run;

    let ready = release::plan_release(cwd, config, options).context("release planning failed")?;

    if !global_json {
        print_header(&ready);
    }

    let interactive = std::io::stdin().is_terminal();
    if !is_dry && !global_json && !args.yes && interactive && ready.is_release() {
        print_step_summary(&ready);
        let confirmed = Confirm::new("Proceed with release?")
            .with_default(true)
            .prompt()
            .context("confirmation prompt failed")?;
        if !confirmed {
            println!("{}", "Release cancelled.".yellow());
            return Ok(());
        }
        println!();
    }

    let spinner: RefCell<Option<ProgressBar>> = RefCell::new(None);
    let vcs = SystemGit::new(cwd);
    let result = ready.execute(&SystemShell, &vcs, |event| {
        if !global_json {
            handle_event(event, is_dry, &spinner);
        }
    });
    if let Some(bar) = spinner.borrow_mut().take() {
        bar.finish_and_clear();
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(ReleaseError::Halted(halted)) => {
            let report = halted.report();
            if global_json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "released": false,
                        "steps": halted.completed,
                        "halted": report,
                    }))?
                );
            } else {
                println!(
                    "  {} {} {}",
                    "✗".red().bold(),
                    report.step.bold(),
                    report.error.red(),
                );
                for line in report.stdout.trim().lines() {
                    println!("      {line}");
                }
                for line in report.stderr.trim().lines() {
                    println!("      {}", line.dimmed());
                }
            }
            return Err(anyhow::Error::new(*halted).context("release halted"));
        }
        Err(other) => return Err(other).context("release failed"),
    };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!();
        let tag = outcome.context.tag.as_deref().unwrap_or_default();
        if is_dry {
            println!(
                "{} Dry run complete, {} step(s) previewed",
                "✓".green(),
                outcome.steps.len(),
            );
        } else if outcome.released {
            println!(
                "{} Released {} ({} steps)",
                "✓".green().bold(),
                tag.green().bold(),
                outcome.steps.len(),
            );
            if let Some(url) = &outcome.context.release_url {
                println!("  {}", url.cyan());
            }
        } else {
            println!("{} Nothing to release", "○".yellow());
        }
        let failed = outcome
            .steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed { .. }))
            .count();
        if failed > 0 {
            println!(
                "  {}",
                format!("{failed} best-effort step(s) failed").yellow()
            );
        }
    }

    Ok(())
}

fn print_header(ready: &ReadyRelease) {
    if ready.options.dry_run {
        println!("\n{}", "DRY RUN: no changes will be made".yellow().bold());
    }
    let previous = ready
        .previous
        .as_ref()
        .map_or_else(|| "none".to_string(), |(tag, _)| tag.clone());
    match &ready.next_tag {
        Some(next) => println!(
            "\n{}: {} → {} ({})",
            "Release".bold(),
            previous.dimmed(),
            next.green().bold(),
            ready.analysis.release,
        ),
        None => println!("\n{}: {} (no release)", "Release".bold(), previous.dimmed()),
    }
    println!(
        "{}: {} accepted, {} rejected",
        "Commits".dimmed(),
        ready.analysis.accepted.len(),
        ready.analysis.rejected.len(),
    );
    super::print_rejections(&ready.analysis.rejected);
    println!();
}

fn print_step_summary(ready: &ReadyRelease) {
    let labels: Vec<String> = ready.steps.iter().map(|s| s.kind.label()).collect();
    println!("  {}: {}", "Steps".dimmed(), labels.join(", ").bold());
    if ready.options.no_push {
        println!("  {}", "(no push)".dimmed());
    }
    println!();
}

/// Handle a step event for terminal progress display.
fn handle_event(event: StepEvent, is_dry: bool, spinner: &RefCell<Option<ProgressBar>>) {
    match event {
        StepEvent::Started { index, step } => {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("  {spinner:.cyan} {msg}") {
                bar.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
            }
            bar.set_message(format!("{index}. {step}..."));
            bar.enable_steady_tick(Duration::from_millis(80));
            if let Some(previous) = spinner.borrow_mut().replace(bar) {
                previous.finish_and_clear();
            }
        }
        StepEvent::Completed(record) => {
            if let Some(bar) = spinner.borrow_mut().take() {
                bar.finish_and_clear();
            }
            print_record(&record, is_dry);
        }
    }
}

fn print_record(record: &StepRecord, is_dry: bool) {
    let step = format!("{}. {}", record.index, record.step);
    match &record.outcome {
        StepOutcome::Success { message } => {
            let prefix = if is_dry { "○" } else { "✓" };
            println!("  {} {} {}", prefix.green(), step.bold(), message.dimmed());
        }
        StepOutcome::Skipped { reason } => {
            println!(
                "  {} {} {}",
                "–".yellow(),
                step.bold(),
                format!("skipped: {reason}").dimmed(),
            );
        }
        StepOutcome::NoRelease { reason } => {
            println!("  {} {} {}", "○".yellow(), step.bold(), reason.dimmed());
        }
        StepOutcome::Failed { error } => {
            println!(
                "  {} {} {}",
                "✗".red(),
                step.bold(),
                format!("failed (best effort): {error}").red(),
            );
        }
    }
}
