//! File-content context messages.
//!
//! The marker text is the de-duplication key: a file counts as "in context"
//! when any message contains its marker.

use std::path::Path;

use minicoder_types::Message;

/// `Content of file '<canonical path>'`
#[must_use]
pub fn file_marker(canonical: &Path) -> String {
    format!("Content of file '{}'", canonical.display())
}

/// Marker line followed by a blank line and the file text.
#[must_use]
pub fn file_context_text(canonical: &Path, content: &str) -> String {
    format!("{}:\n\n{content}", file_marker(canonical))
}

/// System message carrying one file's contents.
#[must_use]
pub fn file_context_message(canonical: &Path, content: &str) -> Message {
    Message::system(file_context_text(canonical, content))
}
