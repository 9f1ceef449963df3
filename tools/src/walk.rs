//! `/add` support: inject a file, or every eligible file under a directory,
//! into the conversation as system messages.

use std::io::Read;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use minicoder_context::{ConversationStore, file_context_message};

use crate::{FileMutator, MAX_FILE_CONTENT_BYTES, ToolError};

/// Files added per directory scan.
pub const MAX_SCANNED_FILES: usize = 1000;
const BINARY_SNIFF_BYTES: u64 = 1024;

const EXCLUDED_NAMES: &[&str] = &[
    ".DS_Store",
    "Thumbs.db",
    ".gitignore",
    ".python-version",
    "uv.lock",
    ".uv",
    "uvenv",
    ".uvenv",
    ".venv",
    "venv",
    "__pycache__",
    ".pytest_cache",
    ".coverage",
    ".mypy_cache",
    "node_modules",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "target",
    ".next",
    ".nuxt",
    "dist",
    "build",
    ".cache",
    ".parcel-cache",
    ".turbo",
    ".vercel",
    ".output",
    ".contentlayer",
    "out",
    "coverage",
    ".nyc_output",
    "storybook-static",
    ".env",
    ".env.local",
    ".env.development",
    ".env.production",
    ".git",
    ".svn",
    ".hg",
    "CVS",
];

/// Matched against the lowercased file name's suffix so that compound
/// extensions like `.min.js` are caught.
const EXCLUDED_SUFFIXES: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".ico", ".svg", ".webp", ".avif", ".mp4", ".webm", ".mov",
    ".mp3", ".wav", ".ogg", ".zip", ".tar", ".gz", ".7z", ".rar", ".exe", ".dll", ".so",
    ".dylib", ".bin", ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".pyc", ".pyo",
    ".pyd", ".egg", ".whl", ".rlib", ".rmeta", ".o", ".a", ".uv", ".uvenv", ".db", ".sqlite",
    ".sqlite3", ".log", ".idea", ".vscode", ".map", ".chunk.js", ".chunk.css", ".min.js",
    ".min.css", ".bundle.js", ".bundle.css", ".cache", ".tmp", ".temp", ".ttf", ".otf",
    ".woff", ".woff2", ".eot",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Excluded,
    TooLarge,
    Binary,
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryScan {
    pub added: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
    pub limit_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddedContext {
    File(PathBuf),
    Directory { root: PathBuf, scan: DirectoryScan },
}

/// Resolve `raw` and append its contents to `store`.
pub fn add_to_context(
    files: &FileMutator,
    raw: &str,
    store: &mut ConversationStore,
) -> Result<AddedContext, ToolError> {
    let path = files.resolve(raw)?;
    if path.is_dir() {
        let scan = scan_directory(&path, store)?;
        tracing::info!(
            root = %path.display(),
            added = scan.added.len(),
            skipped = scan.skipped.len(),
            limit_reached = scan.limit_reached,
            "Added directory to conversation"
        );
        return Ok(AddedContext::Directory { root: path, scan });
    }
    let content = std::fs::read_to_string(&path)?;
    store.append(file_context_message(&path, &content))?;
    tracing::info!(path = %path.display(), "Added file to conversation");
    Ok(AddedContext::File(path))
}

fn scan_directory(root: &Path, store: &mut ConversationStore) -> Result<DirectoryScan, ToolError> {
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && entry.depth() > 0 && is_excluded_name(&entry.file_name().to_string_lossy()))
        })
        .build();

    let mut scan = DirectoryScan::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(%e, "Skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if scan.added.len() >= MAX_SCANNED_FILES {
            scan.limit_reached = true;
            break;
        }

        let path = entry.path();
        let skip = |reason| SkippedFile {
            path: path.to_path_buf(),
            reason,
        };
        let name = entry.file_name().to_string_lossy();
        if is_excluded_name(&name) || has_excluded_suffix(&name) {
            scan.skipped.push(skip(SkipReason::Excluded));
            continue;
        }
        match entry.metadata() {
            Ok(meta) if meta.len() > MAX_FILE_CONTENT_BYTES as u64 => {
                scan.skipped.push(skip(SkipReason::TooLarge));
                continue;
            }
            Ok(_) => {}
            Err(_) => {
                scan.skipped.push(skip(SkipReason::Unreadable));
                continue;
            }
        }
        if looks_binary(path) {
            scan.skipped.push(skip(SkipReason::Binary));
            continue;
        }
        let canonical = match std::fs::canonicalize(path) {
            Ok(canonical) => canonical,
            Err(_) => {
                scan.skipped.push(skip(SkipReason::Unreadable));
                continue;
            }
        };
        match std::fs::read_to_string(&canonical) {
            Ok(content) => {
                store.append(file_context_message(&canonical, &content))?;
                scan.added.push(canonical);
            }
            Err(_) => scan.skipped.push(skip(SkipReason::Unreadable)),
        }
    }
    Ok(scan)
}

fn is_excluded_name(name: &str) -> bool {
    EXCLUDED_NAMES.contains(&name)
}

fn has_excluded_suffix(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    EXCLUDED_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// A NUL byte near the start marks binary content; unreadable counts too.
fn looks_binary(path: &Path) -> bool {
    let mut sample = Vec::with_capacity(BINARY_SNIFF_BYTES as usize);
    match std::fs::File::open(path) {
        Ok(file) => match file.take(BINARY_SNIFF_BYTES).read_to_end(&mut sample) {
            Ok(_) => sample.contains(&0),
            Err(_) => true,
        },
        Err(_) => true,
    }
}
