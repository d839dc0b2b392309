use crate::error::{PatchError, parse_err};

const BEGIN_PATCH: &str = "*** Begin Patch";
const END_PATCH: &str = "*** End Patch";
const ADD_FILE: &str = "*** Add File:";
const DELETE_FILE: &str = "*** Delete File:";
const UPDATE_FILE: &str = "*** Update File:";
const MOVE_TO: &str = "*** Move to:";
const END_OF_FILE: &str = "*** End of File";
const HUNK_MARKER: &str = "@@";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOperation {
    Add {
        file: String,
        /// Body lines with the leading `+` stripped.
        lines: Vec<String>,
    },
    Delete {
        file: String,
    },
    Update {
        file: String,
        move_to: Option<String>,
        hunks: Vec<PatchHunk>,
    },
}

impl PatchOperation {
    #[must_use]
    pub fn file(&self) -> &str {
        match self {
            PatchOperation::Add { file, .. }
            | PatchOperation::Delete { file }
            | PatchOperation::Update { file, .. } => file,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchHunk {
    /// The `@@` line as written.
    pub header: String,
    /// 1-based old-file start line from a `@@ -a,b +c,d @@` header.
    pub source_start: Option<usize>,
    /// Free text after a bare `@@`.
    pub context_hint: Option<String>,
    /// Body lines, each still prefixed with `' '`, `'+'` or `'-'`.
    pub lines: Vec<String>,
    pub is_end_of_file: bool,
}

impl PatchHunk {
    fn from_header(line: &str) -> Self {
        let header = line.trim_end().to_string();
        let rest = header[HUNK_MARKER.len()..].trim();
        let (source_start, context_hint) = if rest.is_empty() {
            (None, None)
        } else if let Some(start) = parse_range_header(rest) {
            (Some(start), None)
        } else {
            (None, Some(rest.to_string()))
        };
        Self {
            header,
            source_start,
            context_hint,
            lines: Vec::new(),
            is_end_of_file: false,
        }
    }

    /// Lines the hunk expects to find: context and removals, prefix stripped.
    #[must_use]
    pub fn old_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|l| l.starts_with(' ') || l.starts_with('-'))
            .map(|l| l[1..].to_string())
            .collect()
    }

    /// Lines the hunk leaves behind: context and additions, prefix stripped.
    #[must_use]
    pub fn new_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|l| l.starts_with(' ') || l.starts_with('+'))
            .map(|l| l[1..].to_string())
            .collect()
    }
}

/// Parse `-a,b +c,d` (optionally followed by `@@`) and return `a`.
fn parse_range_header(rest: &str) -> Option<usize> {
    let rest = rest.strip_suffix(HUNK_MARKER).unwrap_or(rest).trim_end();
    let mut parts = rest.split_whitespace();
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;
    if parts.next().is_some() {
        return None;
    }
    let start = parse_range(old)?;
    parse_range(new)?;
    Some(start)
}

fn parse_range(range: &str) -> Option<usize> {
    let (start, count) = match range.split_once(',') {
        Some((start, count)) => (start, Some(count)),
        None => (range, None),
    };
    if let Some(count) = count {
        count.parse::<usize>().ok()?;
    }
    start.parse::<usize>().ok()
}

/// Operation being assembled while scanning.
enum Pending {
    None,
    Add {
        file: String,
        lines: Vec<String>,
    },
    Update {
        file: String,
        move_to: Option<String>,
        hunks: Vec<PatchHunk>,
        /// True until the first line after the `Update File` header is consumed.
        accepts_move: bool,
    },
}

impl Pending {
    fn finish(self, ops: &mut Vec<PatchOperation>) -> Result<(), PatchError> {
        match self {
            Pending::None => {}
            Pending::Add { file, lines } => ops.push(PatchOperation::Add { file, lines }),
            Pending::Update {
                file,
                move_to,
                hunks,
                ..
            } => {
                if hunks.is_empty() {
                    return Err(parse_err(format!("Update File {file} has no hunks")));
                }
                if let Some(last) = hunks.last() {
                    ensure_hunk_not_empty(&file, last)?;
                }
                ops.push(PatchOperation::Update {
                    file,
                    move_to,
                    hunks,
                });
            }
        }
        Ok(())
    }
}

fn ensure_hunk_not_empty(file: &str, hunk: &PatchHunk) -> Result<(), PatchError> {
    if hunk.lines.is_empty() {
        return Err(parse_err(format!(
            "Hunk {} in {file} has no lines",
            hunk.header
        )));
    }
    Ok(())
}

fn path_after<'a>(line: &'a str, marker: &str) -> Result<&'a str, PatchError> {
    let path = line[marker.len()..].trim();
    if path.is_empty() {
        return Err(parse_err(format!("Missing path after '{marker}'")));
    }
    Ok(path)
}

pub fn parse_patch(input: &str) -> Result<Vec<PatchOperation>, PatchError> {
    let lines: Vec<&str> = input
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();

    let Some(begin) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return Err(parse_err("Patch is empty"));
    };
    if lines[begin].trim() != BEGIN_PATCH {
        return Err(parse_err(format!("First line must be '{BEGIN_PATCH}'")));
    }
    let end = match lines.iter().rposition(|l| !l.trim().is_empty()) {
        Some(end) if end > begin && lines[end].trim() == END_PATCH => end,
        _ => return Err(parse_err(format!("Last line must be '{END_PATCH}'"))),
    };

    let mut ops = Vec::new();
    let mut pending = Pending::None;

    for (offset, &line) in lines[begin + 1..end].iter().enumerate() {
        let line_no = begin + offset + 2;

        if line.starts_with(ADD_FILE) {
            std::mem::replace(&mut pending, Pending::None).finish(&mut ops)?;
            pending = Pending::Add {
                file: path_after(line, ADD_FILE)?.to_string(),
                lines: Vec::new(),
            };
            continue;
        }
        if line.starts_with(DELETE_FILE) {
            std::mem::replace(&mut pending, Pending::None).finish(&mut ops)?;
            ops.push(PatchOperation::Delete {
                file: path_after(line, DELETE_FILE)?.to_string(),
            });
            continue;
        }
        if line.starts_with(UPDATE_FILE) {
            std::mem::replace(&mut pending, Pending::None).finish(&mut ops)?;
            pending = Pending::Update {
                file: path_after(line, UPDATE_FILE)?.to_string(),
                move_to: None,
                hunks: Vec::new(),
                accepts_move: true,
            };
            continue;
        }

        match &mut pending {
            Pending::Update {
                file,
                move_to,
                hunks,
                accepts_move,
            } => {
                let may_move = std::mem::replace(accepts_move, false);
                if line.starts_with(MOVE_TO) {
                    if !may_move {
                        return Err(parse_err(format!(
                            "Line {line_no}: '{MOVE_TO}' must directly follow '{UPDATE_FILE}'"
                        )));
                    }
                    *move_to = Some(path_after(line, MOVE_TO)?.to_string());
                } else if line.starts_with(HUNK_MARKER) {
                    if let Some(last) = hunks.last() {
                        ensure_hunk_not_empty(file, last)?;
                    }
                    hunks.push(PatchHunk::from_header(line));
                } else if line.trim_end() == END_OF_FILE {
                    match hunks.last_mut() {
                        Some(hunk) => hunk.is_end_of_file = true,
                        None => {
                            return Err(parse_err(format!(
                                "Line {line_no}: '{END_OF_FILE}' outside of a hunk"
                            )));
                        }
                    }
                } else if line.starts_with([' ', '+', '-']) {
                    // A lone " " is context for an empty line in the file.
                    match hunks.last_mut() {
                        Some(hunk) => hunk.lines.push(line.to_string()),
                        None if line.trim().is_empty() => {}
                        None => {
                            return Err(parse_err(format!(
                                "Line {line_no}: hunk line before any '{HUNK_MARKER}' header in {file}"
                            )));
                        }
                    }
                } else if line.trim().is_empty() {
                    // blank lines carry nothing
                } else {
                    return Err(parse_err(format!(
                        "Line {line_no}: unexpected line in Update File {file}: {line:?}"
                    )));
                }
            }
            Pending::Add { file, lines } => {
                if line.trim().is_empty() {
                    continue;
                }
                let Some(body) = line.strip_prefix('+') else {
                    return Err(parse_err(format!(
                        "Line {line_no}: Add File {file} body lines must start with '+', got {line:?}"
                    )));
                };
                lines.push(body.to_string());
            }
            Pending::None => {
                if line.trim().is_empty() {
                    continue;
                }
                return Err(parse_err(format!(
                    "Line {line_no}: expected a file operation, got {line:?}"
                )));
            }
        }
    }
    pending.finish(&mut ops)?;

    if ops.is_empty() {
        return Err(parse_err("Patch contains no file operations"));
    }
    Ok(ops)
}
