//! Configuration loading and discovery.
//!
//! Sources are layered with figment, lowest precedence first:
//! 1. Built-in defaults
//! 2. User config from the XDG config directory
//! 3. Project config found by walking up from the working directory
//! 4. Explicit files passed with `--config`
//!
//! # Supported formats
//!
//! TOML (`.toml`), YAML (`.yaml`, `.yml`) and JSON (`.json`).
//!
//! # Config file locations (in order of precedence, highest first):
//! - `.semrel.<ext>` in current directory or any parent
//! - `semrel.<ext>` in current directory or any parent
//! - `~/.config/semrel/config.<ext>` (user config)
//!
//! # Example
//! ```no_run
//! use camino::Utf8PathBuf;
//! use semrel_core::config::{Config, ConfigLoader};
//!
//! let cwd = std::env::current_dir().unwrap();
//! let cwd = Utf8PathBuf::try_from(cwd).expect("current directory is not valid UTF-8");
//! let config = ConfigLoader::new()
//!     .with_project_search(&cwd)
//!     .load()
//!     .unwrap();
//! assert!(!config.lint.types.is_empty());
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use figment::Figment;
use figment::providers::{Format, Json, Serialized, Toml, Yaml};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::plan::{self, StepSpec};
use crate::rules::{self, ReleaseRule};
use crate::version::VersionError;

/// The configuration for semrel.
///
/// Every section has defaults, so an empty file (or no file) yields a
/// working conventional-commit setup.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Log level for the application (e.g., "debug", "info", "warn", "error").
    pub log_level: LogLevel,
    /// Directory for JSONL log files (falls back to platform defaults if unset).
    pub log_dir: Option<Utf8PathBuf>,
    /// Commit message rules.
    pub lint: LintConfig,
    /// Release decision settings.
    pub release: ReleaseConfig,
    /// Release notes layout.
    pub notes: NotesConfig,
    /// Ordered publication steps. Empty means the built-in plan.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepSpec>,
}

impl Config {
    /// The publication plan to run: configured steps, or the default plan.
    pub fn plan(&self) -> Vec<StepSpec> {
        if self.steps.is_empty() {
            plan::default_plan()
        } else {
            self.steps.clone()
        }
    }

    /// Reject configurations that load but cannot drive a release.
    pub fn validate(&self) -> ConfigResult<()> {
        rules::validate_rules(&self.release.rules)?;
        if !self.release.tag_format.contains("{version}") {
            return Err(VersionError::MissingToken(self.release.tag_format.clone()).into());
        }
        Ok(())
    }
}

/// Commit message rules.
///
/// Defaults follow the conventional commit preset: the standard type list
/// and a 100 character ceiling on every line.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LintConfig {
    /// Allowed commit types, in display order.
    pub types: Vec<String>,
    /// Maximum header length in characters.
    pub header_max_length: usize,
    /// Maximum length of each body line.
    pub body_max_line_length: usize,
    /// Maximum length of each footer line.
    pub footer_max_line_length: usize,
    /// Skip merge, fixup, squash and git-revert commits.
    pub default_ignores: bool,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            types: [
                "feat", "fix", "docs", "style", "refactor", "perf", "test", "build", "ci",
                "chore", "revert",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            header_max_length: 100,
            body_max_line_length: 100,
            footer_max_line_length: 100,
            default_ignores: true,
        }
    }
}

/// Release decision settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Branches a release may run from.
    pub branches: Vec<String>,
    /// Tag name template; must contain `{version}`.
    pub tag_format: String,
    /// Version of the first release when no tag exists yet.
    pub initial_version: Version,
    /// Remote used for pushes and repository links.
    pub remote: String,
    /// Ordered release rules; the first matching rule decides per commit.
    pub rules: Vec<ReleaseRule>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            branches: vec!["main".into(), "master".into()],
            tag_format: "v{version}".into(),
            initial_version: Version::new(1, 0, 0),
            remote: "origin".into(),
            rules: rules::default_rules(),
        }
    }
}

/// Release notes layout.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotesConfig {
    /// Sections in output order. Commits of unlisted types are left out.
    pub sections: Vec<NotesSection>,
}

impl Default for NotesConfig {
    fn default() -> Self {
        let section = |t: &str, title: &str| NotesSection {
            commit_type: t.into(),
            title: title.into(),
        };
        Self {
            sections: vec![
                section("feat", "Features"),
                section("fix", "Bug Fixes"),
                section("perf", "Performance Improvements"),
                section("revert", "Reverts"),
            ],
        }
    }
}

/// Maps a commit type to a release notes heading.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NotesSection {
    /// Commit type collected under this heading.
    #[serde(rename = "type")]
    pub commit_type: String,
    /// Heading text.
    pub title: String,
}

/// Log level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose output for debugging and development.
    Debug,
    /// Standard operational information (default).
    #[default]
    Info,
    /// Warnings about potential issues.
    Warn,
    /// Errors that indicate failures.
    Error,
}

impl LogLevel {
    /// Returns the log level as a lowercase string slice.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Supported configuration file extensions (in order of preference).
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Application name for XDG directory lookup and config file names.
const APP_NAME: &str = "semrel";

/// Builder for loading configuration from multiple sources.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Starting directory for project config search.
    project_search_root: Option<Utf8PathBuf>,
    /// Whether to include user config from XDG directory.
    include_user_config: bool,
    /// Stop searching when we hit a directory containing this file/dir.
    boundary_marker: Option<String>,
    /// Explicit config files to load.
    explicit_files: Vec<Utf8PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default settings.
    pub fn new() -> Self {
        Self {
            project_search_root: None,
            include_user_config: true,
            boundary_marker: Some(".git".to_string()),
            explicit_files: Vec::new(),
        }
    }

    /// Set the starting directory for project config search.
    pub fn with_project_search<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.project_search_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set whether to include user config from `~/.config/semrel/`.
    pub const fn with_user_config(mut self, include: bool) -> Self {
        self.include_user_config = include;
        self
    }

    /// Stop directory traversal at a directory containing `marker`.
    /// Default is `.git`.
    pub fn with_boundary_marker<S: Into<String>>(mut self, marker: S) -> Self {
        self.boundary_marker = Some(marker.into());
        self
    }

    /// Disable boundary marker (search all the way to filesystem root).
    pub fn without_boundary_marker(mut self) -> Self {
        self.boundary_marker = None;
        self
    }

    /// Add an explicit config file to load.
    ///
    /// Files are loaded in order, with later files taking precedence.
    /// Explicit files are loaded after discovered files.
    pub fn with_file<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.explicit_files.push(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration, merging all discovered sources.
    ///
    /// Arrays (`lint.types`, `release.rules`, `steps`) are replaced, not
    /// appended, by higher-precedence sources.
    #[tracing::instrument(skip(self), fields(search_root = ?self.project_search_root))]
    pub fn load(self) -> ConfigResult<Config> {
        tracing::debug!("loading configuration");
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if self.include_user_config
            && let Some(user_config) = self.find_user_config()
        {
            figment = Self::merge_file(figment, &user_config);
        }

        if let Some(ref root) = self.project_search_root
            && let Some(project_config) = self.find_project_config(root)
        {
            figment = Self::merge_file(figment, &project_config);
        }

        for file in &self.explicit_files {
            figment = Self::merge_file(figment, file);
        }

        let config: Config = figment
            .extract()
            .map_err(|e| ConfigError::Deserialize(Box::new(e)))?;
        tracing::info!(
            log_level = config.log_level.as_str(),
            rules = config.release.rules.len(),
            steps = config.steps.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    fn find_project_config(&self, start: &Utf8Path) -> Option<Utf8PathBuf> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            if let Some(ref marker) = self.boundary_marker
                && dir.join(marker).exists()
                && dir != start
            {
                break;
            }

            for ext in CONFIG_EXTENSIONS {
                let dotfile = dir.join(format!(".{APP_NAME}.{ext}"));
                if dotfile.is_file() {
                    return Some(dotfile);
                }

                let regular = dir.join(format!("{APP_NAME}.{ext}"));
                if regular.is_file() {
                    return Some(regular);
                }
            }

            current = dir.parent().map(Utf8Path::to_path_buf);
        }

        None
    }

    fn find_user_config(&self) -> Option<Utf8PathBuf> {
        let config_dir = user_config_dir()?;
        CONFIG_EXTENSIONS
            .iter()
            .map(|ext| config_dir.join(format!("config.{ext}")))
            .find(|path| path.is_file())
    }

    /// Merge a config file into the figment, detecting format from extension.
    fn merge_file(figment: Figment, path: &Utf8Path) -> Figment {
        match path.extension() {
            Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path.as_str())),
            Some("json") => figment.merge(Json::file_exact(path.as_str())),
            _ => figment.merge(Toml::file_exact(path.as_str())),
        }
    }
}

/// Find the project config file path without loading it.
pub fn find_project_config<P: AsRef<Utf8Path>>(start: P) -> Option<Utf8PathBuf> {
    ConfigLoader::new()
        .with_project_search(start.as_ref())
        .without_boundary_marker()
        .find_project_config(start.as_ref())
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Get the user config directory path.
///
/// Returns `~/.config/semrel/` on Linux, `~/Library/Application Support/semrel/`
/// on macOS, and equivalent on other platforms.
pub fn user_config_dir() -> Option<Utf8PathBuf> {
    let proj_dirs = project_dirs()?;
    Utf8PathBuf::from_path_buf(proj_dirs.config_dir().to_path_buf()).ok()
}

/// Get the user cache directory path.
pub fn user_cache_dir() -> Option<Utf8PathBuf> {
    let proj_dirs = project_dirs()?;
    Utf8PathBuf::from_path_buf(proj_dirs.cache_dir().to_path_buf()).ok()
}

/// Get the user data directory path.
pub fn user_data_dir() -> Option<Utf8PathBuf> {
    let proj_dirs = project_dirs()?;
    Utf8PathBuf::from_path_buf(proj_dirs.data_dir().to_path_buf()).ok()
}

/// Get the local data directory path (machine-specific, not synced).
pub fn user_data_local_dir() -> Option<Utf8PathBuf> {
    let proj_dirs = project_dirs()?;
    Utf8PathBuf::from_path_buf(proj_dirs.data_local_dir().to_path_buf()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::StepKind;
    use crate::rules::Predicate;
    use crate::version::ReleaseType;
    use std::fs;
    use tempfile::TempDir;

    fn load_toml(contents: &str) -> ConfigResult<Config> {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, contents).unwrap();
        let path = Utf8PathBuf::try_from(path).unwrap();
        ConfigLoader::new()
            .with_user_config(false)
            .with_file(&path)
            .load()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.log_dir.is_none());
        assert_eq!(config.lint.body_max_line_length, 100);
        assert_eq!(config.release.tag_format, "v{version}");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_loader_builds_with_defaults() {
        let config = ConfigLoader::new()
            .with_user_config(false)
            .without_boundary_marker()
            .load()
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_later_file_overrides_earlier() {
        let tmp = TempDir::new().unwrap();

        let base_config = tmp.path().join("base.toml");
        fs::write(&base_config, r#"log_level = "warn""#).unwrap();

        let override_config = tmp.path().join("override.toml");
        fs::write(&override_config, r#"log_level = "error""#).unwrap();

        let base_config = Utf8PathBuf::try_from(base_config).unwrap();
        let override_config = Utf8PathBuf::try_from(override_config).unwrap();

        let config = ConfigLoader::new()
            .with_user_config(false)
            .with_file(&base_config)
            .with_file(&override_config)
            .load()
            .unwrap();

        assert_eq!(config.log_level, LogLevel::Error);
    }

    #[test]
    fn test_project_config_discovery() {
        let tmp = TempDir::new().unwrap();
        let project_dir = tmp.path().join("project");
        let sub_dir = project_dir.join("src").join("deep");
        fs::create_dir_all(&sub_dir).unwrap();

        fs::write(
            project_dir.join(".semrel.toml"),
            "[lint]\nbody_max_line_length = 150\n",
        )
        .unwrap();

        let sub_dir = Utf8PathBuf::try_from(sub_dir).unwrap();

        let config = ConfigLoader::new()
            .with_user_config(false)
            .without_boundary_marker()
            .with_project_search(&sub_dir)
            .load()
            .unwrap();

        assert_eq!(config.lint.body_max_line_length, 150);
        // Untouched keys of the same section keep their defaults.
        assert_eq!(config.lint.footer_max_line_length, 100);
        assert!(config.lint.types.contains(&"feat".to_string()));
    }

    #[test]
    fn test_boundary_marker_stops_search() {
        let tmp = TempDir::new().unwrap();

        let parent = tmp.path().join("parent");
        let child = parent.join("child");
        let work = child.join("work");
        fs::create_dir_all(&work).unwrap();

        fs::write(parent.join(".semrel.toml"), r#"log_level = "warn""#).unwrap();
        fs::create_dir(child.join(".git")).unwrap();

        let work = Utf8PathBuf::try_from(work).unwrap();

        let config = ConfigLoader::new()
            .with_user_config(false)
            .with_boundary_marker(".git")
            .with_project_search(&work)
            .load()
            .unwrap();

        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_yaml_project_config() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("semrel.yaml"),
            "release:\n  tag_format: \"release-{version}\"\n  branches: [trunk]\n",
        )
        .unwrap();
        let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();

        let config = ConfigLoader::new()
            .with_user_config(false)
            .without_boundary_marker()
            .with_project_search(&root)
            .load()
            .unwrap();

        assert_eq!(config.release.tag_format, "release-{version}");
        assert_eq!(config.release.branches, vec!["trunk"]);
        assert_eq!(config.release.remote, "origin");
    }

    #[test]
    fn test_user_config_dir() {
        if let Some(path) = user_config_dir() {
            assert!(path.as_str().contains("semrel"));
        }
    }

    #[test]
    fn test_rules_replace_defaults() {
        let config = load_toml(
            r#"
[[release.rules]]
scope = "no-release"
release = "no-release"

[[release.rules]]
breaking = true
release = "major"

[[release.rules]]
release = "patch"
"#,
        )
        .unwrap();

        let rules = &config.release.rules;
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].predicate, Predicate::ScopeEquals("no-release".into()));
        assert_eq!(rules[1].predicate, Predicate::Breaking);
        assert_eq!(rules[2].predicate, Predicate::Any);
        assert_eq!(rules[2].release, ReleaseType::Patch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rule_with_two_predicates_fails_to_load() {
        let err = load_toml(
            r#"
[[release.rules]]
type = "feat"
scope = "api"
release = "minor"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Deserialize(_)));
    }

    #[test]
    fn test_masked_rules_fail_validation() {
        let config = load_toml(
            r#"
[[release.rules]]
release = "patch"

[[release.rules]]
type = "feat"
release = "minor"
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Rules(_))));
    }

    #[test]
    fn test_tag_format_without_token_fails_validation() {
        let config = load_toml("[release]\ntag_format = \"latest\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::TagFormat(_))));
    }

    #[test]
    fn test_steps_section() {
        let config = load_toml(
            r##"
[[steps]]
step = "analyze"

[[steps]]
step = "changelog"
path = "docs/CHANGES.md"
title = "# Changelog"

[[steps]]
step = "exec"
command = "docker build -t org/app:{version} ."
best_effort = true
"##,
        )
        .unwrap();

        assert_eq!(config.steps.len(), 3);
        assert_eq!(config.steps[0].kind, StepKind::Analyze);
        assert!(matches!(
            &config.steps[1].kind,
            StepKind::Changelog { path, title: Some(_) } if path == "docs/CHANGES.md"
        ));
        assert!(config.steps[2].best_effort);
        assert_eq!(config.plan().len(), 3);
    }

    #[test]
    fn test_empty_steps_use_default_plan() {
        let config = Config::default();
        assert!(config.steps.is_empty());
        assert_eq!(config.plan(), plan::default_plan());
    }

    #[test]
    fn test_unknown_step_fails_to_load() {
        let err = load_toml("[[steps]]\nstep = \"deploy\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Deserialize(_)));
    }

    #[test]
    fn test_notes_sections() {
        let config = load_toml(
            r#"
[[notes.sections]]
type = "feat"
title = "New"
"#,
        )
        .unwrap();
        assert_eq!(config.notes.sections.len(), 1);
        assert_eq!(config.notes.sections[0].title, "New");
    }
}
