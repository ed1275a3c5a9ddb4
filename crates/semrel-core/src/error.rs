//! Error types for semrel-core

use thiserror::Error;

/// Errors that can occur when working with configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error("invalid configuration: {0}")]
    Deserialize(#[from] Box<figment::Error>),

    /// The release rules are loadable but unusable.
    #[error("invalid release rules: {0}")]
    Rules(#[from] crate::rules::RuleError),

    /// The tag format cannot produce or recognise version tags.
    #[error("invalid tag format: {0}")]
    TagFormat(#[from] crate::version::VersionError),
}

/// Result type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;
