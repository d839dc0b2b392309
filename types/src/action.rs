use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single named operation proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolAction {
    /// Correlation id. Defaults to `name:timestamp_ms` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Raw input: a JSON object, or a string that may hold JSON.
    #[serde(default)]
    pub input: Value,
}

impl ToolAction {
    #[must_use]
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            input,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Outcome class of a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolActionStatus {
    Success,
    ApprovalDenied,
    /// Reserved for policy-layer rejections. No code path in this workspace produces it.
    PolicyDenied,
    SandboxDenied,
    ToolNotFound,
    InputInvalid,
    ExecutionFailed,
}

impl ToolActionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ApprovalDenied => "approval_denied",
            Self::PolicyDenied => "policy_denied",
            Self::SandboxDenied => "sandbox_denied",
            Self::ToolNotFound => "tool_not_found",
            Self::InputInvalid => "input_invalid",
            Self::ExecutionFailed => "execution_failed",
        }
    }
}

impl fmt::Display for ToolActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one action.
///
/// Built only through [`ToolActionResult::success`] and [`ToolActionResult::failure`],
/// which keep `success`, `error_type` and `rejected` consistent with `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolActionResult {
    action_id: String,
    tool: String,
    status: ToolActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_type: Option<ToolActionStatus>,
    success: bool,
    observation: String,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<bool>,
}

impl ToolActionResult {
    #[must_use]
    pub fn success(
        action_id: impl Into<String>,
        tool: impl Into<String>,
        observation: impl Into<String>,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            tool: tool.into(),
            status: ToolActionStatus::Success,
            error_type: None,
            success: true,
            observation: observation.into(),
            duration_ms: 0,
            rejected: None,
        }
    }

    /// Build a failed result. Passing [`ToolActionStatus::Success`] yields a success result.
    #[must_use]
    pub fn failure(
        action_id: impl Into<String>,
        tool: impl Into<String>,
        status: ToolActionStatus,
        observation: impl Into<String>,
    ) -> Self {
        if status == ToolActionStatus::Success {
            return Self::success(action_id, tool, observation);
        }
        Self {
            action_id: action_id.into(),
            tool: tool.into(),
            status,
            error_type: Some(status),
            success: false,
            observation: observation.into(),
            duration_ms: 0,
            rejected: (status == ToolActionStatus::ApprovalDenied).then_some(true),
        }
    }

    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    #[must_use]
    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    #[must_use]
    pub fn status(&self) -> ToolActionStatus {
        self.status
    }

    #[must_use]
    pub fn error_type(&self) -> Option<ToolActionStatus> {
        self.error_type
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    #[must_use]
    pub fn observation(&self) -> &str {
        &self.observation
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.rejected.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at (or truncate after) the first rejected action.
    #[default]
    FailFast,
    CollectAll,
}

/// Aggregated result of a batch. Output only, like [`ToolActionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionResult {
    pub results: Vec<ToolActionResult>,
    pub combined_observation: String,
    pub has_rejection: bool,
    pub execution_mode: ExecutionMode,
    pub failure_policy: FailurePolicy,
}

impl ToolExecutionResult {
    /// Derive the combined observation and rejection flag from `results`.
    #[must_use]
    pub fn from_results(
        results: Vec<ToolActionResult>,
        execution_mode: ExecutionMode,
        failure_policy: FailurePolicy,
    ) -> Self {
        let combined_observation = results
            .iter()
            .map(|r| format!("[{}]: {}", r.tool, r.observation))
            .collect::<Vec<_>>()
            .join("\n");
        let has_rejection = results.iter().any(ToolActionResult::is_rejected);
        Self {
            results,
            combined_observation,
            has_rejection,
            execution_mode,
            failure_policy,
        }
    }
}
