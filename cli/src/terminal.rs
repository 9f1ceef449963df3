//! Plain-text rendering of turn progress.

use std::fmt::Write as _;
use std::io::Write;

use minicoder_engine::tools::walk::{AddedContext, SkipReason};
use minicoder_engine::tools::{ToolError, ToolOutcome};
use minicoder_engine::types::ToolInvocation;
use minicoder_engine::{OutputSink, Round};

/// Skipped files listed individually after a directory scan.
const SKIPPED_PREVIEW: usize = 10;

pub(crate) struct TerminalSink<W> {
    out: W,
    reasoning_open: bool,
    text_open: bool,
}

impl<W: Write + Send> TerminalSink<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out,
            reasoning_open: false,
            text_open: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        // Display is best effort.
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

impl<W: Write + Send> OutputSink for TerminalSink<W> {
    fn stream_started(&mut self, _round: Round) {
        self.reasoning_open = false;
        self.text_open = false;
    }

    fn reasoning_delta(&mut self, text: &str) {
        if !self.reasoning_open {
            self.emit("\nReasoning:\n");
            self.reasoning_open = true;
        }
        self.emit(text);
    }

    fn text_delta(&mut self, text: &str) {
        if self.reasoning_open {
            self.emit("\n");
            self.reasoning_open = false;
        }
        if !self.text_open {
            self.emit("\nAssistant> ");
            self.text_open = true;
        }
        self.emit(text);
    }

    fn stream_finished(&mut self, _round: Round) {
        if self.text_open || self.reasoning_open {
            self.emit("\n");
        }
        self.reasoning_open = false;
        self.text_open = false;
    }

    fn tools_started(&mut self, count: usize) {
        self.emit(&format!("\nExecuting {count} function call(s)...\n"));
    }

    fn tool_started(&mut self, invocation: &ToolInvocation) {
        self.emit(&format!("→ {}\n", invocation.name));
    }

    fn tool_finished(&mut self, _invocation: &ToolInvocation, outcome: &ToolOutcome) {
        let mark = if outcome.is_error { '✗' } else { '✓' };
        self.emit(&format!("{mark} {}\n", first_line(&outcome.content)));
    }

    fn notice(&mut self, text: &str) {
        self.emit(&format!("⚠ {text}\n"));
    }
}

fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Excluded => "excluded",
        SkipReason::TooLarge => "exceeds size limit",
        SkipReason::Binary => "binary",
        SkipReason::Unreadable => "unreadable",
    }
}

/// Summary printed after `/add`.
pub(crate) fn describe_added(raw: &str, result: &Result<AddedContext, ToolError>) -> String {
    let mut out = String::new();
    match result {
        Err(e) => {
            let _ = write!(out, "✗ Could not add path '{raw}': {e}");
        }
        Ok(AddedContext::File(path)) => {
            let _ = write!(out, "✓ Added file '{}' to conversation.", path.display());
        }
        Ok(AddedContext::Directory { root, scan }) => {
            let _ = write!(out, "✓ Added folder '{}' to conversation.", root.display());
            if scan.limit_reached {
                let _ = write!(
                    out,
                    "\n⚠ Reached maximum file limit ({})",
                    minicoder_engine::tools::walk::MAX_SCANNED_FILES
                );
            }
            if !scan.added.is_empty() {
                let _ = write!(out, "\nAdded files: ({})", scan.added.len());
                for path in &scan.added {
                    let _ = write!(out, "\n  {}", path.display());
                }
            }
            if !scan.skipped.is_empty() {
                let _ = write!(out, "\nSkipped files: ({})", scan.skipped.len());
                for skipped in scan.skipped.iter().take(SKIPPED_PREVIEW) {
                    let _ = write!(
                        out,
                        "\n  {} ({})",
                        skipped.path.display(),
                        skip_label(skipped.reason)
                    );
                }
                if scan.skipped.len() > SKIPPED_PREVIEW {
                    let _ = write!(
                        out,
                        "\n  ... and {} more",
                        scan.skipped.len() - SKIPPED_PREVIEW
                    );
                }
            }
        }
    }
    out
}
