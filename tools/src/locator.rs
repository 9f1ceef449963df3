//! Exact-then-fuzzy excerpt location for partial file edits.

use thiserror::Error;

/// Where an exact excerpt was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnippetMatch {
    Unique { offset: usize },
    /// More than one occurrence; `offset` is the leftmost.
    Ambiguous { offset: usize, occurrences: usize },
}

impl SnippetMatch {
    #[must_use]
    pub fn offset(self) -> usize {
        match self {
            Self::Unique { offset } | Self::Ambiguous { offset, .. } => offset,
        }
    }

    #[must_use]
    pub fn occurrences(self) -> usize {
        match self {
            Self::Unique { .. } => 1,
            Self::Ambiguous { occurrences, .. } => occurrences,
        }
    }
}

/// Best line window found when the excerpt is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialMatch {
    /// 1-based line where the window starts.
    pub line: usize,
    /// Excerpt lines contained in the window, at most `total_lines`.
    pub score: usize,
    pub total_lines: usize,
    /// Trimmed text of the window's first line.
    pub first_line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnippetError {
    #[error("Original snippet is empty")]
    EmptyOriginal,
    #[error(
        "Original snippet not found. Best match score: {}/{total_lines}{}",
        .best.as_ref().map_or(0, |b| b.score),
        closest_suffix(.best.as_ref())
    )]
    NotFound {
        total_lines: usize,
        best: Option<PartialMatch>,
    },
}

fn closest_suffix(best: Option<&PartialMatch>) -> String {
    best.map(|b| format!(" (closest match starts at line {})", b.line))
        .unwrap_or_default()
}

/// Find `original` in `content`.
///
/// A single exact occurrence is unique; several are ambiguous and resolve to
/// the leftmost. With none, a line-window search reports the closest region
/// as diagnostic context and the lookup fails.
pub fn locate(content: &str, original: &str) -> Result<SnippetMatch, SnippetError> {
    if original.trim().is_empty() {
        return Err(SnippetError::EmptyOriginal);
    }

    let mut offsets = content.match_indices(original).map(|(at, _)| at);
    match (offsets.next(), offsets.count()) {
        (Some(offset), 0) => Ok(SnippetMatch::Unique { offset }),
        (Some(offset), rest) => Ok(SnippetMatch::Ambiguous {
            offset,
            occurrences: rest + 1,
        }),
        (None, _) => {
            let wanted: Vec<&str> = original.trim().lines().map(str::trim).collect();
            let best = best_partial_match(content, &wanted);
            Err(SnippetError::NotFound {
                total_lines: wanted.len(),
                best,
            })
        }
    }
}

/// Replace the located occurrence, leaving everything else intact.
#[must_use]
pub fn splice(content: &str, found: SnippetMatch, original: &str, replacement: &str) -> String {
    let start = found.offset();
    let end = start + original.len();
    let mut updated = String::with_capacity(content.len() - original.len() + replacement.len());
    updated.push_str(&content[..start]);
    updated.push_str(replacement);
    updated.push_str(&content[end..]);
    updated
}

/// Highest containment score wins; ties go to the window whose first line
/// shares the longest prefix with the excerpt's first line, then to the
/// earliest window.
fn best_partial_match(content: &str, wanted: &[&str]) -> Option<PartialMatch> {
    let lines: Vec<&str> = content.lines().map(str::trim).collect();
    let width = wanted.len();
    if width == 0 || lines.len() < width {
        return None;
    }
    let head = wanted[0];

    let mut best: Option<(usize, usize, usize)> = None;
    for start in 0..=lines.len() - width {
        let window = &lines[start..start + width];
        let score = window
            .iter()
            .zip(wanted)
            .filter(|(candidate, want)| candidate.contains(**want))
            .count();
        let prefix = common_prefix_len(window[0], head);
        let better = match best {
            None => true,
            Some((_, best_score, best_prefix)) => {
                score > best_score || (score == best_score && prefix > best_prefix)
            }
        };
        if better {
            best = Some((start, score, prefix));
        }
    }

    best.map(|(start, score, _)| PartialMatch {
        line: start + 1,
        score,
        total_lines: width,
        first_line: lines[start].to_string(),
    })
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}
