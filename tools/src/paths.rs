//! Path validation for every file capability.
//!
//! Raw arguments are screened lexically before any filesystem access, then
//! resolved against the working directory and canonicalized.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("Invalid path: empty path")]
    Empty,
    #[error("Invalid path: {path} contains parent directory references")]
    ParentTraversal { path: String },
    #[error("Home directory references not allowed: {path}")]
    HomeReference { path: String },
    #[error("File content exceeds 5MB size limit ({bytes} bytes)")]
    ContentTooLarge { bytes: usize },
    #[error("Invalid path: {path}: {source}")]
    Unresolvable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reject traversal and home shorthand without touching the filesystem.
pub fn screen(raw: &str) -> Result<&Path, PathError> {
    if raw.trim().is_empty() {
        return Err(PathError::Empty);
    }
    let path = Path::new(raw);
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(PathError::ParentTraversal {
                    path: raw.to_string(),
                });
            }
            Component::Normal(part) if part.to_string_lossy().starts_with('~') => {
                return Err(PathError::HomeReference {
                    path: raw.to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(path)
}

/// Screen `raw`, then canonicalize it relative to `working_dir`.
///
/// Paths that do not exist yet resolve through their nearest existing
/// ancestor so that creates get the same absolute form as later reads.
pub fn resolve(raw: &str, working_dir: &Path) -> Result<PathBuf, PathError> {
    let path = screen(raw)?;
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    };
    canonicalize_for_create(&joined).map_err(|source| PathError::Unresolvable {
        path: raw.to_string(),
        source,
    })
}

fn canonicalize_for_create(joined: &Path) -> std::io::Result<PathBuf> {
    if joined.exists() {
        return std::fs::canonicalize(joined);
    }

    let mut missing: Vec<&OsStr> = Vec::new();
    let mut ancestor = Some(joined);
    while let Some(candidate) = ancestor {
        if candidate.exists() {
            break;
        }
        if let Some(name) = candidate.file_name() {
            missing.push(name);
        }
        ancestor = candidate.parent();
    }

    let existing = ancestor.ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "no existing ancestor")
    })?;
    let mut resolved = std::fs::canonicalize(existing)?;
    for part in missing.into_iter().rev() {
        resolved.push(part);
    }
    Ok(resolved)
}
