//! Locating hunks inside file content and splicing them in.

use crate::error::PatchError;
use crate::parser::PatchHunk;
use crate::seek::find_candidates;

/// Lines within this distance of a `source_start` hint count as anchored.
const ANCHOR_WINDOW: usize = 2;

/// File content split into lines, remembering how to put it back together.
struct Lines {
    lines: Vec<String>,
    eol: &'static str,
    trailing_newline: bool,
}

impl Lines {
    fn split(content: &str) -> Self {
        let eol = if content.contains("\r\n") { "\r\n" } else { "\n" };
        let trailing_newline = content.is_empty() || content.ends_with('\n');
        let lines = content
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();
        Self {
            lines,
            eol,
            trailing_newline,
        }
    }

    fn join(self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let mut out = self.lines.join(self.eol);
        if self.trailing_newline {
            out.push_str(self.eol);
        }
        out
    }
}

/// Apply `hunks` in order to `content`. `file` is only used in error messages.
pub fn apply_hunks(content: &str, hunks: &[PatchHunk], file: &str) -> Result<String, PatchError> {
    let mut doc = Lines::split(content);
    for hunk in hunks {
        let (start, old_len, new_lines) = locate(&doc.lines, hunk, file)?;
        doc.lines.splice(start..start + old_len, new_lines);
    }
    Ok(doc.join())
}

/// Resolve a hunk to `(start, old_len, replacement)`.
fn locate(
    lines: &[String],
    hunk: &PatchHunk,
    file: &str,
) -> Result<(usize, usize, Vec<String>), PatchError> {
    let offset = match &hunk.context_hint {
        Some(hint) => anchor_offset(lines, hint, file)?,
        None => 0,
    };
    let old_lines = hunk.old_lines();
    let new_lines = hunk.new_lines();

    if old_lines.is_empty() {
        let at = match hunk.source_start {
            Some(start) => start.saturating_sub(1).min(lines.len()),
            None => lines.len(),
        };
        return Ok((at.max(offset), 0, new_lines));
    }

    let candidates = find_candidates(lines, &old_lines, offset, hunk.is_end_of_file);
    let start = disambiguate(&candidates, hunk, file)?;
    Ok((start, old_lines.len(), new_lines))
}

/// Index just past the single line matching `hint`.
fn anchor_offset(lines: &[String], hint: &str, file: &str) -> Result<usize, PatchError> {
    let candidates = find_candidates(lines, &[hint.to_string()], 0, false);
    match candidates.as_slice() {
        [index] => Ok(index + 1),
        [] => Err(PatchError::HintNotFound {
            file: file.to_string(),
            hint: hint.to_string(),
        }),
        many => Err(PatchError::AmbiguousHint {
            file: file.to_string(),
            hint: hint.to_string(),
            count: many.len(),
        }),
    }
}

fn disambiguate(candidates: &[usize], hunk: &PatchHunk, file: &str) -> Result<usize, PatchError> {
    let ambiguous = |count: usize| PatchError::AmbiguousHunk {
        file: file.to_string(),
        header: hunk.header.clone(),
        count,
    };

    if let Some(source_start) = hunk.source_start {
        let target = source_start.saturating_sub(1);
        let anchored: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&c| c.abs_diff(target) <= ANCHOR_WINDOW)
            .collect();
        match anchored.as_slice() {
            [only] => return Ok(*only),
            [] => {}
            many => return Err(ambiguous(many.len())),
        }
    }

    match candidates {
        [only] => Ok(*only),
        [] => Err(PatchError::ContextNotFound {
            file: file.to_string(),
            header: hunk.header.clone(),
        }),
        many => Err(ambiguous(many.len())),
    }
}
