//! Commit message classification.
//!
//! Validates a raw commit message against the conventional commit grammar
//!
//! ```text
//! type(scope)!: subject
//!
//! body
//!
//! footer
//! ```
//!
//! and the configured type vocabulary and line-length ceilings. The result
//! is either a structured [`CommitMessage`] or a single [`Rejection`]; a
//! rejected message never contributes to a release decision.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LintConfig;

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<type>\w+)(?:\((?P<scope>[^()\r\n]+)\))?(?P<breaking>!)?: (?P<subject>\S.*)$")
        .expect("header pattern is valid")
});

static FOOTER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:BREAKING[ -]CHANGE|[A-Za-z][\w-]*)(?:: | #)").expect("footer pattern is valid")
});

static BREAKING_NOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^BREAKING[ -]CHANGE: ?(?P<note>.*)$").expect("breaking pattern is valid")
});

static IGNORED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:Merge (?:pull request|branch|tag|remote-tracking branch) |Merge .+ into .+|Merged |[Rr]evert |(?:fixup|squash)! |Automatic merge|Auto-merged )",
    )
    .expect("ignore pattern is valid")
});

/// Git's scissors line; everything below it is dropped from the message.
const SCISSORS: &str = "# ------------------------ >8 ------------------------";

/// Part of a commit message a length rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// The first line.
    Header,
    /// Free text between header and footer.
    Body,
    /// Trailing `token: value` lines.
    Footer,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::Body => write!(f, "body"),
            Self::Footer => write!(f, "footer"),
        }
    }
}

/// Why a commit message was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    /// The header does not match `type(scope)?!?: subject`.
    #[error("header must match `type(scope)?!?: subject`, got {header:?}")]
    MalformedHeader {
        /// The offending first line.
        header: String,
    },

    /// The type is not part of the configured vocabulary.
    #[error("type {found:?} is not one of [{}]", .allowed.join(", "))]
    UnknownType {
        /// The type found in the header.
        found: String,
        /// The configured vocabulary.
        allowed: Vec<String>,
    },

    /// A line exceeds the ceiling configured for its section.
    #[error("{section} line {line} has {length} characters, limit is {max}")]
    LineTooLong {
        /// Which ceiling was exceeded.
        section: Section,
        /// 1-based line number within the whole message.
        line: usize,
        /// Length of the line in characters.
        length: usize,
        /// The configured ceiling.
        max: usize,
    },

    /// The subject ends with a full stop.
    #[error("subject must not end with a full stop")]
    SubjectFullStop,
}

/// Non-fatal findings; reported but never cause a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LintWarning {
    /// The body does not start with a blank line.
    BodyLeadingBlank,
    /// The footer does not start with a blank line.
    FooterLeadingBlank,
}

impl std::fmt::Display for LintWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BodyLeadingBlank => write!(f, "body must have a leading blank line"),
            Self::FooterLeadingBlank => write!(f, "footer must have a leading blank line"),
        }
    }
}

/// A commit message that passed classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMessage {
    /// The commit type (e.g. `feat`).
    #[serde(rename = "type")]
    pub commit_type: String,
    /// Optional scope from `type(scope): ...`.
    pub scope: Option<String>,
    /// Set by a `!` marker or a `BREAKING CHANGE:` footer.
    pub breaking: bool,
    /// Whether the header carried the `!` marker.
    #[serde(default)]
    pub bang: bool,
    /// Text after `: ` on the header line.
    pub subject: String,
    /// Body paragraphs, if any.
    pub body: Option<String>,
    /// Footer lines, if any.
    pub footer: Option<String>,
    /// Text of the `BREAKING CHANGE:` footer, if present.
    pub breaking_note: Option<String>,
    /// Non-fatal findings.
    pub warnings: Vec<LintWarning>,
}

impl CommitMessage {
    /// Reassemble the header line.
    pub fn header(&self) -> String {
        let scope = self
            .scope
            .as_deref()
            .map(|s| format!("({s})"))
            .unwrap_or_default();
        let bang = if self.bang { "!" } else { "" };
        format!("{}{scope}{bang}: {}", self.commit_type, self.subject)
    }
}

/// An accepted commit together with the revision it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedCommit {
    /// Full commit hash.
    pub hash: String,
    /// The classified message.
    pub message: CommitMessage,
}

impl ClassifiedCommit {
    /// Abbreviated hash for display.
    pub fn short_hash(&self) -> &str {
        self.hash.get(..7).unwrap_or(&self.hash)
    }
}

/// Classify a raw commit message.
///
/// Checks run in a fixed order so that the reported reason is stable:
/// header shape, type vocabulary, header length, subject full stop, body
/// line lengths, footer line lengths.
pub fn classify(raw: &str, lint: &LintConfig) -> Result<CommitMessage, Rejection> {
    let text = raw.replace("\r\n", "\n");
    let lines: Vec<&str> = text
        .trim_start_matches('\n')
        .trim_end()
        .lines()
        .map(str::trim_end)
        .collect();

    let (header, rest) = lines.split_first().map_or(("", &[][..]), |(h, r)| (*h, r));

    let caps = HEADER
        .captures(header)
        .ok_or_else(|| Rejection::MalformedHeader {
            header: header.to_string(),
        })?;

    let commit_type = &caps["type"];
    if !lint.types.iter().any(|t| t == commit_type) {
        return Err(Rejection::UnknownType {
            found: commit_type.to_string(),
            allowed: lint.types.clone(),
        });
    }

    let header_len = header.chars().count();
    if header_len > lint.header_max_length {
        return Err(Rejection::LineTooLong {
            section: Section::Header,
            line: 1,
            length: header_len,
            max: lint.header_max_length,
        });
    }

    let subject = caps["subject"].trim_end();
    if subject.ends_with('.') {
        return Err(Rejection::SubjectFullStop);
    }

    let footer_at = footer_start(rest).unwrap_or(rest.len());
    let (body_lines, footer_lines) = rest.split_at(footer_at);

    // Line numbers: header is line 1, `rest` starts at line 2.
    check_lengths(body_lines, 2, Section::Body, lint.body_max_line_length)?;
    check_lengths(
        footer_lines,
        footer_at + 2,
        Section::Footer,
        lint.footer_max_line_length,
    )?;

    let mut warnings = Vec::new();
    if body_lines.first().is_some_and(|l| !l.trim().is_empty()) {
        warnings.push(LintWarning::BodyLeadingBlank);
    }
    if !footer_lines.is_empty() && (footer_at == 0 || !rest[footer_at - 1].trim().is_empty()) {
        warnings.push(LintWarning::FooterLeadingBlank);
    }

    let breaking_note = breaking_note(footer_lines);
    let bang = caps.name("breaking").is_some();

    Ok(CommitMessage {
        commit_type: commit_type.to_string(),
        scope: caps.name("scope").map(|m| m.as_str().to_string()),
        breaking: bang || breaking_note.is_some(),
        bang,
        subject: subject.to_string(),
        body: join_paragraphs(body_lines),
        footer: join_paragraphs(footer_lines),
        breaking_note,
        warnings,
    })
}

/// Whether a message is skipped entirely (merge commits, fixups, git reverts).
pub fn is_ignored(raw: &str) -> bool {
    let header = raw.trim_start().lines().next().unwrap_or("");
    IGNORED.is_match(header)
}

/// Remove git comment lines and everything below the scissors line.
///
/// Used for messages read from `COMMIT_EDITMSG`.
pub fn strip_comments(raw: &str) -> String {
    raw.lines()
        .take_while(|line| *line != SCISSORS)
        .filter(|line| !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Index of the first footer line within the lines after the header.
///
/// The footer is the final paragraph when it is a trailer block: it opens
/// with a `token: value` / `token #value` line and every other line is a
/// token line or indented. `BREAKING CHANGE:` starts a footer wherever it
/// appears, and its unindented continuation lines stay in the footer.
fn footer_start(rest: &[&str]) -> Option<usize> {
    let breaking = rest.iter().position(|line| BREAKING_NOTE.is_match(line));
    match (breaking, trailer_block(rest)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn trailer_block(rest: &[&str]) -> Option<usize> {
    let start = rest
        .iter()
        .rposition(|line| line.trim().is_empty())
        .map_or(0, |i| i + 1);
    let block = &rest[start..];
    if !block.first().is_some_and(|line| FOOTER_TOKEN.is_match(line)) {
        return None;
    }

    let mut in_breaking_note = false;
    block
        .iter()
        .all(|line| {
            if FOOTER_TOKEN.is_match(line) {
                in_breaking_note = BREAKING_NOTE.is_match(line);
                true
            } else {
                in_breaking_note || line.starts_with(char::is_whitespace)
            }
        })
        .then_some(start)
}

fn check_lengths(
    lines: &[&str],
    first_line: usize,
    section: Section,
    max: usize,
) -> Result<(), Rejection> {
    for (offset, line) in lines.iter().enumerate() {
        let length = line.chars().count();
        if length > max {
            return Err(Rejection::LineTooLong {
                section,
                line: first_line + offset,
                length,
                max,
            });
        }
    }
    Ok(())
}

/// The breaking-change note, including continuation lines up to the next token.
fn breaking_note(footer: &[&str]) -> Option<String> {
    let start = footer.iter().position(|l| BREAKING_NOTE.is_match(l))?;
    let first = BREAKING_NOTE.captures(footer[start])?["note"].to_string();

    let mut note = vec![first];
    note.extend(
        footer[start + 1..]
            .iter()
            .take_while(|l| !FOOTER_TOKEN.is_match(l))
            .map(|l| (*l).to_string()),
    );
    let note = note.join("\n").trim().to_string();
    Some(note).filter(|n| !n.is_empty())
}

fn join_paragraphs(lines: &[&str]) -> Option<String> {
    let joined = lines.join("\n");
    let trimmed = joined.trim_matches('\n');
    (!trimmed.trim().is_empty()).then(|| trimmed.to_string())
}
