//! Core domain types for toolhost.
//!
//! Pure data: no IO, no async, minimal dependencies. Every layer (exec runtime,
//! patch engine, tools, orchestrator, CLI) speaks in these types.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)]

mod action;
mod approval;
mod content;
pub mod text;

pub use action::{
    ExecutionMode, FailurePolicy, ToolAction, ToolActionResult, ToolActionStatus,
    ToolExecutionResult,
};
pub use approval::{
    ApprovalCheck, ApprovalDecision, ApprovalMode, ApprovalRequest, ApprovalResponse, RiskLevel,
};
pub use content::{CallToolResult, ContentItem};
