//! Mapping free-text execution errors to result statuses.

use toolhost_tools::ToolError;
use toolhost_types::ToolActionStatus;

/// Lowercase substrings that mark an error as a sandbox or permission denial.
const SANDBOX_MARKERS: &[&str] = &[
    "sandbox",
    "permission denied",
    "operation not permitted",
    "eacces",
    "eperm",
    "access is denied",
];

/// Best-effort: the OS and most libraries only give us text.
#[must_use]
pub fn classify_error(message: &str) -> ToolActionStatus {
    let lower = message.to_lowercase();
    if SANDBOX_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ToolActionStatus::SandboxDenied
    } else {
        ToolActionStatus::ExecutionFailed
    }
}

#[must_use]
pub fn classify_tool_error(err: &ToolError) -> ToolActionStatus {
    match err {
        ToolError::SandboxViolation(_) => ToolActionStatus::SandboxDenied,
        other => classify_error(&other.to_string()),
    }
}
