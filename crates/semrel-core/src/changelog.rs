//! Changelog file maintenance.
//!
//! New release notes go on top, newest first, below an optional title that
//! is kept as the first line of the file.

use std::fs;
use std::io::ErrorKind;

use camino::Utf8Path;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from changelog updates.
#[derive(Error, Debug)]
pub enum ChangelogError {
    /// Reading or writing the changelog failed.
    #[error("failed to update {path}: {source}")]
    Io {
        /// The changelog path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Result alias for changelog operations.
pub type ChangelogResult<T> = Result<T, ChangelogError>;

/// Prepend `notes` to the changelog at `path`, creating it if missing.
///
/// Returns `false` without touching the file when its heading is already
/// present.
#[instrument(skip(notes, title))]
pub fn prepend(path: &Utf8Path, notes: &str, title: Option<&str>) -> ChangelogResult<bool> {
    let io_err = |source| ChangelogError::Io {
        path: path.to_string(),
        source,
    };

    let existing = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_err(e)),
    };

    let Some(updated) = render(&existing, notes, title) else {
        debug!("changelog already contains this release");
        return Ok(false);
    };

    if let Some(parent) = path.parent()
        && !parent.as_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, updated).map_err(io_err)?;
    debug!("changelog updated");
    Ok(true)
}

/// New changelog contents, or `None` if `notes` is already in `existing`.
pub fn render(existing: &str, notes: &str, title: Option<&str>) -> Option<String> {
    // The heading ends with ` (date)`; a re-run on another day is the same release.
    let heading = notes.lines().next().unwrap_or_default().trim();
    let key = heading.rsplit_once(" (").map_or(heading, |(key, _)| key);
    let dated = format!("{key} (");
    if !key.is_empty()
        && existing
            .lines()
            .map(str::trim)
            .any(|line| line == heading || line.starts_with(&dated))
    {
        return None;
    }

    let mut body = existing.trim();
    if let Some(title) = title {
        body = body.strip_prefix(title.trim()).unwrap_or(body).trim_start();
    }

    let mut out = String::new();
    if let Some(title) = title {
        out.push_str(title.trim());
        out.push_str("\n\n");
    }
    out.push_str(notes.trim());
    if !body.is_empty() {
        out.push_str("\n\n");
        out.push_str(body);
    }
    out.push('\n');
    Some(out)
}
