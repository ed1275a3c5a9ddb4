//! Release notes rendering.
//!
//! Produces the markdown block used both as the changelog entry and as the
//! body of the hosted release:
//!
//! ```markdown
//! # [1.2.0](https://github.com/owner/repo/compare/v1.1.0...v1.2.0) (2024-05-01)
//!
//! ### Features
//!
//! * **cli:** add --json ([abc1234](https://github.com/owner/repo/commit/abc1234...))
//!
//! ### BREAKING CHANGES
//!
//! * **cli:** `--old` is gone
//! ```
//!
//! Major and minor releases get a level-one heading, patch releases a
//! level-two heading.

use crate::commit::ClassifiedCommit;
use crate::config::NotesSection;
use crate::version::ReleaseType;

/// Release identity shown in the notes heading.
#[derive(Debug, Clone, Copy)]
pub struct NotesHeader<'a> {
    /// The new version.
    pub version: &'a str,
    /// The tag for this release.
    pub tag: &'a str,
    /// The tag of the previous release, for the compare link.
    pub previous_tag: Option<&'a str>,
    /// Release date.
    pub date: &'a str,
    /// Release type; selects the heading level.
    pub release_type: ReleaseType,
    /// Browsable repository URL for links.
    pub repo_url: Option<&'a str>,
}

/// Render release notes for `commits`, grouped by `sections`.
///
/// Commits whose type has no section are omitted, except that every
/// breaking change is listed under `BREAKING CHANGES`.
pub fn render(
    header: &NotesHeader<'_>,
    commits: &[ClassifiedCommit],
    sections: &[NotesSection],
) -> String {
    let mut out = heading(header);

    for section in sections {
        let entries: Vec<String> = commits
            .iter()
            .filter(|c| c.message.commit_type == section.commit_type)
            .map(|c| entry(c, header.repo_url))
            .collect();
        if entries.is_empty() {
            continue;
        }
        out.push_str(&format!("\n\n### {}\n\n{}", section.title, entries.join("\n")));
    }

    let breaking: Vec<String> = commits
        .iter()
        .filter(|c| c.message.breaking)
        .map(|c| {
            let text = c
                .message
                .breaking_note
                .as_deref()
                .unwrap_or(&c.message.subject);
            format!("* {}{text}", scope_prefix(c))
        })
        .collect();
    if !breaking.is_empty() {
        out.push_str(&format!("\n\n### BREAKING CHANGES\n\n{}", breaking.join("\n")));
    }

    out.push('\n');
    out
}

/// First line of the notes, used to detect an already-written entry.
pub fn heading(header: &NotesHeader<'_>) -> String {
    let level = if header.release_type == ReleaseType::Patch {
        "##"
    } else {
        "#"
    };
    let title = match (header.repo_url, header.previous_tag) {
        (Some(url), Some(prev)) => format!(
            "[{}]({url}/compare/{prev}...{})",
            header.version, header.tag
        ),
        _ => header.version.to_string(),
    };
    format!("{level} {title} ({})", header.date)
}

fn entry(commit: &ClassifiedCommit, repo_url: Option<&str>) -> String {
    let short = commit.short_hash();
    let link = repo_url.map_or_else(
        || format!("({short})"),
        |url| format!("([{short}]({url}/commit/{}))", commit.hash),
    );
    format!("* {}{} {link}", scope_prefix(commit), commit.message.subject)
}

fn scope_prefix(commit: &ClassifiedCommit) -> String {
    commit
        .message
        .scope
        .as_deref()
        .map(|s| format!("**{s}:** "))
        .unwrap_or_default()
}
