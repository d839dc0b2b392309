//! Tool orchestration: approval gating, dispatch, error classification, and output
//! bounding for batches of tool actions.

mod approval;
mod classify;
mod hooks;
mod orchestrator;
mod output_guard;

pub use approval::{ApprovalManager, ApprovalPolicy, PolicyApprovalManager, fingerprint};
pub use classify::{classify_error, classify_tool_error};
pub use hooks::{ApprovalFut, ApprovalHooks, NoHooks, StaticDecisionHooks};
pub use orchestrator::{ExecuteOptions, MAX_INPUT_CHARS, ToolOrchestrator};
pub use output_guard::{
    DEFAULT_MAX_RESULT_CHARS, MAX_RESULT_CHARS_ENV, estimate_chars, guard_output,
    max_result_chars_from_env, parse_max_result_chars,
};
