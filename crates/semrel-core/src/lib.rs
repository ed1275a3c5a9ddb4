//! Core library for semrel.
//!
//! Conventional-commit linting and semantic releases for a single
//! repository: classify commit messages, decide the release type from
//! ordered rules, and run an ordered publication plan.
//!
//! # Modules
//!
//! - [`commit`] - Commit message classification
//! - [`rules`] - Release rules and the release decision
//! - [`version`] - Release types, version arithmetic, tag formats
//! - [`plan`] - Publication steps and plan execution
//! - [`release`] - Planning and running a release for a repository
//! - [`pipeline`] - The context shared by publication steps
//! - [`notes`] - Release notes rendering
//! - [`changelog`] - Changelog file maintenance
//! - [`package`] - Package manifest version rewriting
//! - [`exec`] - Shell command execution and templates
//! - [`git`] - Git operations for release workflows
//! - [`preflight`] - Release readiness checks
//! - [`config`] - Configuration loading and management
//! - [`error`] - Configuration error types
//!
//! # Quick Start
//!
//! ```no_run
//! use semrel_core::{Config, ConfigLoader};
//! use semrel_core::commit::classify;
//!
//! let config = ConfigLoader::new()
//!     .with_user_config(true)
//!     .load()
//!     .expect("Failed to load configuration");
//!
//! let message = classify("feat(cli): add --json", &config.lint).unwrap();
//! assert_eq!(message.commit_type, "feat");
//! ```
#![deny(unsafe_code)]

pub mod changelog;

pub mod commit;

pub mod config;

pub mod error;

pub mod exec;

pub mod git;

pub mod notes;

pub mod package;

pub mod pipeline;

pub mod plan;

pub mod preflight;

pub mod release;

pub mod rules;

pub mod version;

pub use config::{Config, ConfigLoader, LogLevel};

pub use error::{ConfigError, ConfigResult};

// Re-export semver so downstream crates don't need a direct dependency.
pub use semver;
