//! Release rule evaluation.
//!
//! Rules are an ordered list of `predicate → release type` pairs. For each
//! commit the first matching rule decides its contribution; a commit no
//! rule matches contributes [`ReleaseType::NoRelease`]. The release decision
//! for a batch is the most severe contribution.
//!
//! In configuration files a rule names at most one predicate field:
//!
//! ```toml
//! [[release.rules]]
//! scope = "no-release"
//! release = "no-release"
//!
//! [[release.rules]]
//! breaking = true
//! release = "major"
//!
//! [[release.rules]]
//! type = "feat"
//! release = "minor"
//!
//! # no predicate field: matches every commit, must come last
//! [[release.rules]]
//! release = "patch"
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::commit::CommitMessage;
use crate::version::ReleaseType;

/// Errors from rule parsing and validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// A rule names more than one predicate field.
    #[error("a rule may match on only one of scope, breaking, type; found {}", .fields.join(", "))]
    AmbiguousPredicate {
        /// The predicate fields that were set.
        fields: Vec<&'static str>,
    },

    /// `breaking = false` would match every non-breaking commit.
    #[error("`breaking = false` is not a predicate; omit the field for a catch-all rule")]
    BreakingFalse,

    /// A catch-all rule precedes other rules, which can then never match.
    #[error("catch-all rule at position {} masks the {masked} rule(s) after it", .index + 1)]
    MaskedRules {
        /// 0-based index of the catch-all rule.
        index: usize,
        /// Number of unreachable rules.
        masked: usize,
    },
}

/// Result alias for rule operations.
pub type RuleResult<T> = Result<T, RuleError>;

/// What a rule matches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// The commit scope equals the value.
    ScopeEquals(String),
    /// The commit is a breaking change.
    Breaking,
    /// The commit type equals the value.
    TypeEquals(String),
    /// Every commit.
    Any,
}

impl Predicate {
    /// Whether the predicate holds for `commit`.
    pub fn matches(&self, commit: &CommitMessage) -> bool {
        match self {
            Self::ScopeEquals(scope) => commit.scope.as_deref() == Some(scope.as_str()),
            Self::Breaking => commit.breaking,
            Self::TypeEquals(t) => commit.commit_type == *t,
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScopeEquals(scope) => write!(f, "scope = {scope}"),
            Self::Breaking => write!(f, "breaking"),
            Self::TypeEquals(t) => write!(f, "type = {t}"),
            Self::Any => write!(f, "*"),
        }
    }
}

/// One `predicate → release type` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RuleSpec", into = "RuleSpec")]
pub struct ReleaseRule {
    /// What the rule matches on.
    pub predicate: Predicate,
    /// Contribution of a matching commit.
    pub release: ReleaseType,
}

impl ReleaseRule {
    /// Create a rule.
    pub const fn new(predicate: Predicate, release: ReleaseType) -> Self {
        Self { predicate, release }
    }
}

/// On-disk shape of a [`ReleaseRule`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    /// Match on scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Match breaking changes; only `true` is meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaking: Option<bool>,
    /// Match on commit type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub commit_type: Option<String>,
    /// Contribution of a matching commit.
    pub release: ReleaseType,
}

impl TryFrom<RuleSpec> for ReleaseRule {
    type Error = RuleError;

    fn try_from(spec: RuleSpec) -> RuleResult<Self> {
        let fields: Vec<&'static str> = [
            spec.scope.as_ref().map(|_| "scope"),
            spec.breaking.map(|_| "breaking"),
            spec.commit_type.as_ref().map(|_| "type"),
        ]
        .into_iter()
        .flatten()
        .collect();
        if fields.len() > 1 {
            return Err(RuleError::AmbiguousPredicate { fields });
        }

        let predicate = match (spec.scope, spec.breaking, spec.commit_type) {
            (Some(scope), _, _) => Predicate::ScopeEquals(scope),
            (_, Some(true), _) => Predicate::Breaking,
            (_, Some(false), _) => return Err(RuleError::BreakingFalse),
            (_, _, Some(t)) => Predicate::TypeEquals(t),
            (None, None, None) => Predicate::Any,
        };
        Ok(Self::new(predicate, spec.release))
    }
}

impl From<ReleaseRule> for RuleSpec {
    fn from(rule: ReleaseRule) -> Self {
        let mut spec = Self {
            release: rule.release,
            ..Self::default()
        };
        match rule.predicate {
            Predicate::ScopeEquals(scope) => spec.scope = Some(scope),
            Predicate::Breaking => spec.breaking = Some(true),
            Predicate::TypeEquals(t) => spec.commit_type = Some(t),
            Predicate::Any => {}
        }
        spec
    }
}

/// The built-in rule set.
///
/// A `no-release` scope opts a commit out, breaking changes are major,
/// `feat` is minor and `fix`, `perf`, `revert` are patch. Everything else,
/// `refactor` included, does not release.
pub fn default_rules() -> Vec<ReleaseRule> {
    vec![
        ReleaseRule::new(
            Predicate::ScopeEquals("no-release".into()),
            ReleaseType::NoRelease,
        ),
        ReleaseRule::new(Predicate::Breaking, ReleaseType::Major),
        ReleaseRule::new(Predicate::TypeEquals("revert".into()), ReleaseType::Patch),
        ReleaseRule::new(Predicate::TypeEquals("feat".into()), ReleaseType::Minor),
        ReleaseRule::new(Predicate::TypeEquals("fix".into()), ReleaseType::Patch),
        ReleaseRule::new(Predicate::TypeEquals("perf".into()), ReleaseType::Patch),
    ]
}

/// Contribution of a single commit: the first matching rule, else no release.
pub fn contribution(rules: &[ReleaseRule], commit: &CommitMessage) -> ReleaseType {
    match rules.iter().find(|rule| rule.predicate.matches(commit)) {
        Some(rule) => rule.release,
        None => ReleaseType::NoRelease,
    }
}

/// The release decision for a batch: the most severe contribution.
#[instrument(skip_all, fields(rules = rules.len()))]
pub fn decide<'a, I>(rules: &[ReleaseRule], commits: I) -> ReleaseType
where
    I: IntoIterator<Item = &'a CommitMessage>,
{
    let decision = commits
        .into_iter()
        .map(|commit| contribution(rules, commit))
        .fold(ReleaseType::NoRelease, Ord::max);
    debug!(%decision, "release decision");
    decision
}

/// Reject a catch-all rule that is not last.
pub fn validate_rules(rules: &[ReleaseRule]) -> RuleResult<()> {
    if let Some(index) = rules.iter().position(|r| r.predicate == Predicate::Any)
        && index + 1 < rules.len()
    {
        return Err(RuleError::MaskedRules {
            index,
            masked: rules.len() - index - 1,
        });
    }
    Ok(())
}
