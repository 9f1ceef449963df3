//! Validated file reads, creates and snippet replacements.

use std::path::{Path, PathBuf};

use crate::ToolError;
use crate::locator::{self, SnippetError};
use crate::paths::{self, PathError};

/// Content ceiling for any write, in bytes.
pub const MAX_FILE_CONTENT_BYTES: usize = 5_000_000;

/// Result of a successful snippet replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditReport {
    pub path: PathBuf,
    /// Exact occurrences found; only the first was replaced.
    pub occurrences: usize,
}

#[derive(Debug, Clone)]
pub struct FileMutator {
    working_dir: PathBuf,
}

impl FileMutator {
    /// Operate relative to `working_dir`, which must exist.
    pub fn new(working_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            working_dir: std::fs::canonicalize(working_dir)?,
        })
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn resolve(&self, raw: &str) -> Result<PathBuf, PathError> {
        paths::resolve(raw, &self.working_dir)
    }

    /// Read a UTF-8 file, returning its canonical path alongside the text.
    pub async fn read(&self, raw: &str) -> Result<(PathBuf, String), ToolError> {
        let path = self.resolve(raw)?;
        let content = tokio::fs::read_to_string(&path).await?;
        Ok((path, content))
    }

    /// Create or overwrite a file, creating missing parent directories.
    pub async fn create(&self, raw: &str, content: &str) -> Result<PathBuf, ToolError> {
        let path = self.resolve(raw)?;
        write_checked(&path, content).await?;
        Ok(path)
    }

    /// Replace the first occurrence of `original` with `replacement`.
    ///
    /// The whole file is rewritten through the create path; nothing is
    /// written when the excerpt cannot be located.
    pub async fn replace_snippet(
        &self,
        raw: &str,
        original: &str,
        replacement: &str,
    ) -> Result<EditReport, ToolError> {
        let (path, content) = self.read(raw).await?;
        let found = match locator::locate(&content, original) {
            Ok(found) => found,
            Err(err) => {
                if let SnippetError::NotFound {
                    best: Some(best), ..
                } = &err
                {
                    tracing::warn!(
                        path = %path.display(),
                        line = best.line,
                        score = best.score,
                        total = best.total_lines,
                        near = %best.first_line,
                        "Snippet not found; closest partial match"
                    );
                }
                return Err(err.into());
            }
        };
        if found.occurrences() > 1 {
            tracing::warn!(
                path = %path.display(),
                occurrences = found.occurrences(),
                "Multiple matches found; replacing the first"
            );
        }

        let updated = locator::splice(&content, found, original, replacement);
        write_checked(&path, &updated).await?;
        Ok(EditReport {
            path,
            occurrences: found.occurrences(),
        })
    }
}

async fn write_checked(path: &Path, content: &str) -> Result<(), ToolError> {
    if content.len() > MAX_FILE_CONTENT_BYTES {
        return Err(PathError::ContentTooLarge {
            bytes: content.len(),
        }
        .into());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    tracing::info!(path = %path.display(), bytes = content.len(), "Wrote file");
    Ok(())
}
