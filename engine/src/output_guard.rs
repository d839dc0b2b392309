//! Replaces oversized tool results with a short system hint.

use toolhost_types::text::xml_escape;
use toolhost_types::{CallToolResult, ContentItem};

pub const MAX_RESULT_CHARS_ENV: &str = "MEMO_TOOL_RESULT_MAX_CHARS";
pub const DEFAULT_MAX_RESULT_CHARS: usize = 12_000;

/// Size charged for a non-text item that cannot be serialized.
const UNSERIALIZABLE_ITEM_CHARS: usize = 100;

fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

/// Positive integer from `raw`, else the default.
#[must_use]
pub fn parse_max_result_chars(raw: Option<&str>) -> usize {
    raw.and_then(parse_positive)
        .unwrap_or(DEFAULT_MAX_RESULT_CHARS)
}

/// The threshold set through the environment, if it is a positive integer.
#[must_use]
pub fn max_result_chars_from_env() -> Option<usize> {
    let raw = std::env::var(MAX_RESULT_CHARS_ENV).ok()?;
    let parsed = parse_positive(&raw);
    if parsed.is_none() {
        tracing::warn!(value = %raw, "Ignoring invalid {MAX_RESULT_CHARS_ENV}");
    }
    parsed
}

#[must_use]
pub fn estimate_chars(result: &CallToolResult) -> usize {
    result
        .content
        .iter()
        .map(|item| match item {
            ContentItem::Text { text } => text.chars().count(),
            other => serde_json::to_string(other)
                .map(|s| s.chars().count())
                .unwrap_or(UNSERIALIZABLE_ITEM_CHARS),
        })
        .sum()
}

/// `result` unchanged when within `max_chars`, otherwise a single hint item.
#[must_use]
pub fn guard_output(tool: &str, result: CallToolResult, max_chars: usize) -> CallToolResult {
    let actual = estimate_chars(&result);
    if actual <= max_chars {
        return result;
    }
    tracing::warn!(tool, actual_chars = actual, max_chars, "Tool output omitted");
    let hint = format!(
        "<system_hint type=\"tool_output_omitted\" tool=\"{}\" reason=\"too_long\" actual_chars=\"{actual}\" max_chars=\"{max_chars}\">{}</system_hint>",
        xml_escape(tool),
        xml_escape(&format!(
            "Output of {tool} was {actual} characters, over the {max_chars} character limit. \
             Narrow the request (filter, paginate, or limit output) and try again."
        )),
    );
    CallToolResult {
        content: vec![ContentItem::text(hint)],
        is_error: result.is_error,
    }
}
