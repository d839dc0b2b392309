use std::io;
use std::path::PathBuf;

/// Appended to every parse error so the model can correct its output.
pub const FORMAT_HINT: &str = "\n\nExpected patch format:\n*** Begin Patch\n*** Add File: <path>\n+<line>\n*** Delete File: <path>\n*** Update File: <path>\n*** Move to: <path> (optional)\n@@ <context line or -start,count +start,count @@>\n <context>\n-<removed>\n+<added>\n*** End of File (optional)\n*** End Patch";

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("Invalid patch: {message}{hint}", hint = FORMAT_HINT)]
    Parse { message: String },
    #[error("Ambiguous hunk in {file}: {header} matches {count} locations")]
    AmbiguousHunk {
        file: String,
        header: String,
        count: usize,
    },
    #[error("Context not found in {file} for hunk {header}")]
    ContextNotFound { file: String, header: String },
    #[error("Context hint {hint:?} not found in {file}")]
    HintNotFound { file: String, hint: String },
    #[error("Context hint {hint:?} is ambiguous in {file} ({count} matches)")]
    AmbiguousHint {
        file: String,
        hint: String,
        count: usize,
    },
    #[error("{op} failed for {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub(crate) fn parse_err(message: impl Into<String>) -> PatchError {
    PatchError::Parse {
        message: message.into(),
    }
}
