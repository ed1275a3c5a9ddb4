//! Notes command: preview the release notes for unreleased commits.

use anyhow::{Context, bail};
use clap::Args;
use serde::Serialize;
use tracing::{debug, instrument};

use semrel_core::config::Config;

/// Arguments for the `notes` subcommand.
#[derive(Args, Debug, Default)]
pub struct NotesArgs {
    /// Write the notes to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<camino::Utf8PathBuf>,
}

#[derive(Serialize)]
struct NotesOutput<'a> {
    version: String,
    tag: &'a str,
    notes: &'a str,
}

/// Execute the notes command.
#[instrument(name = "cmd_notes", skip_all)]
pub fn cmd_notes(
    args: NotesArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    debug!("rendering release notes preview");

    let ready = super::plan_for_report(config, cwd)?;
    let (Some(notes), Some(version), Some(tag)) = (
        ready.notes_preview(),
        ready.next_version.as_ref(),
        ready.next_tag.as_deref(),
    ) else {
        bail!("no release-worthy commits since the last release");
    };

    if let Some(path) = &args.output {
        std::fs::write(path, &notes).with_context(|| format!("failed to write {path}"))?;
        debug!(%path, "notes written");
    }

    if global_json {
        let output = NotesOutput {
            version: version.to_string(),
            tag,
            notes: &notes,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if args.output.is_none() {
        print!("{notes}");
    }

    Ok(())
}
