//! Dangerous-command guard consulted before anything reaches a shell.
//!
//! The guard only blocks commands with no legitimate agent use case. Everything else
//! is the approval layer's business.

use regex::RegexSet;
use toolhost_types::text::{prefix_chars, xml_escape};

use crate::ExecError;

/// Decides whether a command line may run.
pub trait CommandGuard: Send + Sync {
    /// `None` allows the command. `Some(message)` blocks it; the message is returned to
    /// the caller verbatim in place of command output.
    fn check(&self, command: &str, session_id: Option<u32>) -> Option<String>;
}

/// Guard that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CommandGuard for AllowAll {
    fn check(&self, _command: &str, _session_id: Option<u32>) -> Option<String> {
        None
    }
}

/// Default blacklist patterns: `(regex, reason)`.
///
/// Use `(?i)` for case-insensitive matching; odd casing (`RM -RF /`) usually means
/// someone is trying to slip past a filter.
pub const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    (
        r"(?i)\brm\s+(?:(?:--recursive|-[^\s-]*[rR][^\s-]*)(?:\s+(?:--[\w-]+|-[^\s]+))*|(?:--[\w-]+|-[^\s]+)\s+(?:--recursive|-[^\s-]*[rR][^\s-]*)(?:\s+(?:--[\w-]+|-[^\s]+))*)\s+(?:--\s+)?(?:/+|/\*|/\.\*(?:/+)?|/(?:\.{1,2})(?:/\.{1,2})*(?:/+)?)(?:\s|$|[&|;])",
        "Attempting to delete root filesystem",
    ),
    (
        r"(?i)\brm\s+(?:(?:--recursive|-[^\s-]*[rR][^\s-]*)(?:\s+(?:--[\w-]+|-[^\s]+))*|(?:--[\w-]+|-[^\s]+)\s+(?:--recursive|-[^\s-]*[rR][^\s-]*)(?:\s+(?:--[\w-]+|-[^\s]+))*)\s+(?:--\s+)?(?:~|\$HOME|\$\{HOME\})(?:\s|$|[&|;/])",
        "Attempting to delete home directory",
    ),
    (r":\(\)\s*\{\s*:\|:&\s*\}\s*;:", "Fork bomb detected"),
    (
        r"(?i)\bdd\s+.*of=/dev/(?:sd|hd|nvme|vd|xvd|loop)\w*",
        "Attempting to overwrite disk device",
    ),
    (
        r"(?i)>\s*/dev/(?:sd|hd|nvme|vd|xvd)\w*",
        "Attempting to overwrite disk device",
    ),
    (
        r"(?i)\bmkfs(?:\.\w+)?\s+/dev/(?:sd|hd|nvme|vd|xvd)\w*",
        "Attempting to format disk device",
    ),
    (
        r"(?i)\bchmod\s+-R\s+\d+\s+/(?:\s|$|[&|;])",
        "Recursive permission change on root filesystem",
    ),
    (
        r"(?i)Remove-Item\s+(?:C:\\|~)\s+-(?:Recurse|Force)\s+-(?:Recurse|Force)",
        "Attempting to delete system drive or home directory",
    ),
    (
        r"(?i)Remove-Item\s+-(?:Recurse|Force)\s+-(?:Recurse|Force)\s+(?:C:\\|~)(?:\s|$)",
        "Attempting to delete system drive or home directory",
    ),
    (
        r"(?i)\brd\s+/[sq]\s+/[sq]\s+[A-Z]:\\(?:\s|$)",
        "Attempting to recursively delete drive via rd",
    ),
];

/// Regex blacklist over whole command lines.
#[derive(Debug, Clone)]
pub struct CommandBlacklist {
    regex_set: RegexSet,
    /// Parallel to the patterns in `regex_set`.
    reasons: Vec<String>,
}

impl CommandBlacklist {
    pub fn new(patterns: &[(&str, &str)]) -> Result<Self, ExecError> {
        let regex_set = RegexSet::new(patterns.iter().map(|(pattern, _)| *pattern))
            .map_err(|source| ExecError::InvalidBlacklist { source })?;
        let reasons = patterns
            .iter()
            .map(|(_, reason)| (*reason).to_string())
            .collect();
        Ok(Self { regex_set, reasons })
    }

    pub fn with_defaults() -> Result<Self, ExecError> {
        Self::new(DEFAULT_PATTERNS)
    }

    /// Reason of the first matching pattern, if any.
    #[must_use]
    pub fn matched_reason(&self, command: &str) -> Option<&str> {
        self.regex_set
            .matches(command)
            .iter()
            .next()
            .map(|idx| self.reasons[idx].as_str())
    }
}

impl CommandGuard for CommandBlacklist {
    fn check(&self, command: &str, session_id: Option<u32>) -> Option<String> {
        let reason = self.matched_reason(command)?;
        tracing::warn!(reason, ?session_id, "Blocked dangerous command");
        Some(blocked_message(command, reason, session_id))
    }
}

fn blocked_message(command: &str, reason: &str, session_id: Option<u32>) -> String {
    let shown = prefix_chars(command, 100);
    let ellipsis = if shown.len() < command.len() { "..." } else { "" };
    let session_attr = session_id
        .map(|id| format!(" session_id=\"{id}\""))
        .unwrap_or_default();
    format!(
        "<system_hint type=\"dangerous_command\" reason=\"{}\"{session_attr}>Command blocked: {}{ellipsis}. It was not executed.</system_hint>",
        xml_escape(reason),
        xml_escape(shown),
    )
}
