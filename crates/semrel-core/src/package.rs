//! Package metadata version rewriting.
//!
//! Updates the top-level `"version"` of a `package.json` style manifest in
//! place. Key order is preserved. Lockfiles that carry the root package
//! under `packages[""]` get that entry updated too.

use std::fs;

use camino::Utf8Path;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from manifest updates.
#[derive(Error, Debug)]
pub enum PackageError {
    /// Reading or writing the manifest failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// The manifest path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The manifest is not valid JSON.
    #[error("{path} is not valid JSON: {source}")]
    Json {
        /// The manifest path.
        path: String,
        /// Parse error.
        source: serde_json::Error,
    },

    /// The manifest root is not a JSON object.
    #[error("{0} must contain a JSON object")]
    NotAnObject(String),
}

/// Result alias for manifest operations.
pub type PackageResult<T> = Result<T, PackageError>;

/// Set the version in the manifest at `path`.
///
/// Returns `false` without writing when the version is already `version`.
#[instrument]
pub fn set_version(path: &Utf8Path, version: &str) -> PackageResult<bool> {
    let contents = fs::read_to_string(path).map_err(|source| PackageError::Io {
        path: path.to_string(),
        source,
    })?;

    let Some(updated) = rewrite(&contents, version).map_err(|e| match e {
        RewriteError::Json(source) => PackageError::Json {
            path: path.to_string(),
            source,
        },
        RewriteError::NotAnObject => PackageError::NotAnObject(path.to_string()),
    })?
    else {
        debug!("version already set");
        return Ok(false);
    };

    fs::write(path, updated).map_err(|source| PackageError::Io {
        path: path.to_string(),
        source,
    })?;
    debug!("manifest updated");
    Ok(true)
}

enum RewriteError {
    Json(serde_json::Error),
    NotAnObject,
}

/// Manifest text with `version` applied, or `None` when unchanged.
fn rewrite(contents: &str, version: &str) -> Result<Option<String>, RewriteError> {
    let mut manifest: Value = serde_json::from_str(contents).map_err(RewriteError::Json)?;
    let root = manifest.as_object_mut().ok_or(RewriteError::NotAnObject)?;

    let target = Value::String(version.to_string());
    let mut changed = root.get("version") != Some(&target);
    root.insert("version".into(), target.clone());

    if let Some(Value::Object(lock_root)) = root
        .get_mut("packages")
        .and_then(|packages| packages.get_mut(""))
        && lock_root.contains_key("version")
    {
        changed |= lock_root.get("version") != Some(&target);
        lock_root.insert("version".into(), target);
    }

    if !changed {
        return Ok(None);
    }
    let mut out = serde_json::to_string_pretty(&manifest).map_err(RewriteError::Json)?;
    out.push('\n');
    Ok(Some(out))
}
