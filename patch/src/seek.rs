//! Line-sequence search with progressively looser comparison.

use unicode_normalization::UnicodeNormalization;

/// Comparison modes, strictest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchMode {
    Exact,
    TrimEnd,
    Trim,
    /// Typographic dashes, quotes and spaces folded to ASCII, then NFKC.
    Normalized,
}

pub(crate) const MODES: [MatchMode; 4] = [
    MatchMode::Exact,
    MatchMode::TrimEnd,
    MatchMode::Trim,
    MatchMode::Normalized,
];

impl MatchMode {
    fn eq(self, a: &str, b: &str) -> bool {
        match self {
            MatchMode::Exact => a == b,
            MatchMode::TrimEnd => a.trim_end() == b.trim_end(),
            MatchMode::Trim => a.trim() == b.trim(),
            MatchMode::Normalized => normalize(a) == normalize(b),
        }
    }
}

fn fold_char(ch: char) -> char {
    match ch {
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
        | '\u{2212}' | '\u{FE58}' | '\u{FE63}' | '\u{FF0D}' => '-',
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '\u{FF07}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{FF02}' => '"',
        '\u{00A0}' | '\u{2002}' | '\u{2003}' | '\u{2004}' | '\u{2005}' | '\u{2006}'
        | '\u{2007}' | '\u{2008}' | '\u{2009}' | '\u{200A}' | '\u{202F}' | '\u{205F}'
        | '\u{3000}' => ' ',
        other => other,
    }
}

fn normalize(s: &str) -> String {
    s.trim().chars().map(fold_char).nfkc().collect()
}

/// Every start index at or after `from` where `pattern` matches `lines` under `mode`.
fn positions(lines: &[String], pattern: &[String], from: usize, mode: MatchMode) -> Vec<usize> {
    if pattern.is_empty() || pattern.len() > lines.len() {
        return Vec::new();
    }
    let last_start = lines.len() - pattern.len();
    (from..=last_start)
        .filter(|&start| matches_at(lines, pattern, start, mode))
        .collect()
}

fn matches_at(lines: &[String], pattern: &[String], start: usize, mode: MatchMode) -> bool {
    lines[start..start + pattern.len()]
        .iter()
        .zip(pattern)
        .all(|(line, want)| mode.eq(line, want))
}

/// Candidate positions from the first mode that yields any.
///
/// With `prefer_eof`, a match flush against the end of the file is returned alone
/// when the current mode finds one there.
pub(crate) fn find_candidates(
    lines: &[String],
    pattern: &[String],
    from: usize,
    prefer_eof: bool,
) -> Vec<usize> {
    for mode in MODES {
        if prefer_eof && pattern.len() <= lines.len() {
            let eof_start = lines.len() - pattern.len();
            if eof_start >= from && matches_at(lines, pattern, eof_start, mode) {
                return vec![eof_start];
            }
        }
        let found = positions(lines, pattern, from, mode);
        if !found.is_empty() {
            if mode != MatchMode::Exact {
                tracing::debug!(?mode, candidates = found.len(), "Hunk matched loosely");
            }
            return found;
        }
    }
    Vec::new()
}
