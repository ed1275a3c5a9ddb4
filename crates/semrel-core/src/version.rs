//! Release types and version arithmetic.
//!
//! A [`ReleaseType`] is the outcome of evaluating release rules against a
//! commit. Release types are totally ordered by severity, so the decision
//! for a batch of commits is simply the maximum.

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from version operations.
#[derive(Error, Debug)]
pub enum VersionError {
    /// Failed to parse a semver string.
    #[error("invalid semver: {0}")]
    InvalidSemver(#[from] semver::Error),

    /// A tag does not follow the configured tag format.
    #[error("tag {tag} does not match format {format}")]
    TagFormat {
        /// The tag that was inspected.
        tag: String,
        /// The configured format (e.g. `v{version}`).
        format: String,
    },

    /// The tag format does not contain the `{version}` token.
    #[error("tag format {0} must contain {{version}}")]
    MissingToken(String),
}

/// Result alias for version operations.
pub type VersionResult<T> = Result<T, VersionError>;

/// Severity of a release, ordered `no-release < patch < minor < major`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseType {
    /// The commit does not trigger a release.
    #[default]
    NoRelease,
    /// Patch release (x.y.Z).
    Patch,
    /// Minor release (x.Y.0).
    Minor,
    /// Major release (X.0.0).
    Major,
}

impl ReleaseType {
    /// Whether this outcome triggers a release at all.
    pub const fn is_release(self) -> bool {
        !matches!(self, Self::NoRelease)
    }
}

impl std::fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRelease => write!(f, "no-release"),
            Self::Patch => write!(f, "patch"),
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
        }
    }
}

/// Compute the next version by applying a release type.
///
/// Returns `None` for [`ReleaseType::NoRelease`]. Pre-release and build
/// metadata on `current` are dropped.
pub const fn next_version(current: &Version, release: ReleaseType) -> Option<Version> {
    match release {
        ReleaseType::NoRelease => None,
        ReleaseType::Patch => Some(Version::new(
            current.major,
            current.minor,
            current.patch + 1,
        )),
        ReleaseType::Minor => Some(Version::new(current.major, current.minor + 1, 0)),
        ReleaseType::Major => Some(Version::new(current.major + 1, 0, 0)),
    }
}

/// The version a release would carry.
///
/// The first release (no previous version) is `initial` whatever the
/// release type, as long as something is released at all.
pub fn release_version(
    previous: Option<&Version>,
    release: ReleaseType,
    initial: &Version,
) -> Option<Version> {
    match previous {
        _ if !release.is_release() => None,
        Some(previous) => next_version(previous, release),
        None => Some(initial.clone()),
    }
}

/// Parse a version string, stripping an optional `v` prefix.
pub fn parse_version(s: &str) -> VersionResult<Version> {
    let s = s.strip_prefix('v').unwrap_or(s);
    Ok(Version::parse(s)?)
}

/// Render a tag name from a format such as `v{version}`.
pub fn format_tag(format: &str, version: &Version) -> String {
    format.replace("{version}", &version.to_string())
}

/// Extract the version from a tag produced by [`format_tag`].
pub fn version_from_tag(format: &str, tag: &str) -> VersionResult<Version> {
    let (prefix, suffix) = format
        .split_once("{version}")
        .ok_or_else(|| VersionError::MissingToken(format.to_string()))?;

    let inner = tag
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(suffix))
        .ok_or_else(|| VersionError::TagFormat {
            tag: tag.to_string(),
            format: format.to_string(),
        })?;

    Ok(Version::parse(inner)?)
}

/// Glob pattern matching every tag of the given format (`v{version}` → `v*`).
pub fn tag_glob(format: &str) -> String {
    format.replace("{version}", "*")
}
