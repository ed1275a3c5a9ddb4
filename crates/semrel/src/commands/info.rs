//! Info command: show package, configuration and release setup.

use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use semrel_core::config::{self, Config};
use semrel_core::release::{describe_rules, describe_sections};

/// Arguments for the `info` subcommand.
#[derive(Args, Debug, Default)]
pub struct InfoArgs {
    // No subcommand-specific arguments; uses global --json flag
}

#[derive(Serialize)]
struct PackageInfo {
    name: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    repository: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    homepage: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    license: &'static str,
}

impl PackageInfo {
    const fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            description: env!("CARGO_PKG_DESCRIPTION"),
            repository: env!("CARGO_PKG_REPOSITORY"),
            homepage: env!("CARGO_PKG_HOMEPAGE"),
            license: env!("CARGO_PKG_LICENSE"),
        }
    }
}

#[derive(Serialize)]
struct ConfigInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    config_file: Option<String>,
    log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_dir: Option<String>,
}

impl ConfigInfo {
    fn from_config(config: &Config, cwd: &camino::Utf8Path) -> Self {
        Self {
            config_file: config::find_project_config(cwd).map(|p| p.to_string()),
            log_level: config.log_level.as_str().to_string(),
            log_dir: config.log_dir.as_ref().map(|p| p.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ReleaseInfo {
    types: Vec<String>,
    header_max_length: usize,
    branches: Vec<String>,
    tag_format: String,
    rules: Vec<String>,
    sections: Vec<String>,
    steps: Vec<String>,
}

impl ReleaseInfo {
    fn from_config(config: &Config) -> Self {
        Self {
            types: config.lint.types.clone(),
            header_max_length: config.lint.header_max_length,
            branches: config.release.branches.clone(),
            tag_format: config.release.tag_format.clone(),
            rules: describe_rules(&config.release.rules),
            sections: describe_sections(&config.notes.sections),
            steps: config
                .plan()
                .iter()
                .map(|s| {
                    let label = s.kind.label();
                    if s.best_effort {
                        format!("{label} (best effort)")
                    } else {
                        label
                    }
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct FullInfo {
    #[serde(flatten)]
    package: PackageInfo,
    config: ConfigInfo,
    release: ReleaseInfo,
}

/// Print package information and the effective release setup.
///
/// # Arguments
/// * `global_json` - Global `--json` flag from CLI
/// * `config` - Loaded configuration
/// * `cwd` - Current working directory for config discovery
#[instrument(name = "cmd_info", skip_all, fields(json_output))]
pub fn cmd_info(
    _args: InfoArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    let info = PackageInfo::new();

    debug!(json_output = global_json, "executing info command");

    let full_info = FullInfo {
        package: info,
        config: ConfigInfo::from_config(config, cwd),
        release: ReleaseInfo::from_config(config),
    };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&full_info)?);
        return Ok(());
    }

    println!(
        "{} {}",
        full_info.package.name.bold(),
        full_info.package.version.green()
    );
    if !full_info.package.description.is_empty() {
        println!("{}", full_info.package.description);
    }
    if !full_info.package.license.is_empty() {
        println!("{}: {}", "License".dimmed(), full_info.package.license);
    }
    if !full_info.package.repository.is_empty() {
        println!(
            "{}: {}",
            "Repository".dimmed(),
            full_info.package.repository.cyan()
        );
    }
    if !full_info.package.homepage.is_empty() {
        println!(
            "{}: {}",
            "Homepage".dimmed(),
            full_info.package.homepage.cyan()
        );
    }

    println!();
    println!("{}", "Configuration".bold().underline());
    if let Some(ref path) = full_info.config.config_file {
        println!("{}: {}", "Config file".dimmed(), path.cyan());
    } else {
        println!("{}: {}", "Config file".dimmed(), "none loaded".yellow());
    }
    println!("{}: {}", "Log level".dimmed(), full_info.config.log_level);
    if let Some(ref dir) = full_info.config.log_dir {
        println!("{}: {}", "Log directory".dimmed(), dir);
    }

    let release = &full_info.release;
    println!();
    println!("{}", "Commit Rules".bold().underline());
    println!("{}: {}", "Types".dimmed(), release.types.join(", ").cyan());
    println!(
        "{}: {}",
        "Header limit".dimmed(),
        release.header_max_length
    );

    println!();
    println!("{}", "Release".bold().underline());
    println!("{}: {}", "Branches".dimmed(), release.branches.join(", ").cyan());
    println!("{}: {}", "Tag format".dimmed(), release.tag_format.cyan());
    println!("{}:", "Rules (first match wins)".dimmed());
    for rule in &release.rules {
        println!("  {rule}");
    }
    println!("{}:", "Notes sections".dimmed());
    for section in &release.sections {
        println!("  {section}");
    }
    println!("{}:", "Steps".dimmed());
    for (index, step) in release.steps.iter().enumerate() {
        println!("  {}. {step}", index + 1);
    }

    Ok(())
}
