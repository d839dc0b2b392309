//! Runs tool actions through approval, dispatch, and the output guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::{Map, Value};
use toolhost_tools::{ToolKind, ToolRegistry};
use toolhost_types::{
    ApprovalRequest, ApprovalResponse, ExecutionMode, FailurePolicy, ToolAction,
    ToolActionResult, ToolActionStatus, ToolExecutionResult,
};

use crate::approval::ApprovalManager;
use crate::classify::classify_tool_error;
use crate::hooks::ApprovalHooks;
use crate::output_guard::{DEFAULT_MAX_RESULT_CHARS, guard_output, max_result_chars_from_env};

/// String inputs longer than this are rejected before parsing.
pub const MAX_INPUT_CHARS: usize = 100_000;

const NO_OUTPUT: &str = "(no tool output)";

/// Batch options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecuteOptions {
    pub execution_mode: ExecutionMode,
    pub failure_policy: Option<FailurePolicy>,
    /// Deprecated: `false` means `collect_all` when no policy is given.
    pub stop_on_rejection: Option<bool>,
}

impl ExecuteOptions {
    #[must_use]
    pub fn resolved_failure_policy(&self) -> FailurePolicy {
        match (self.failure_policy, self.stop_on_rejection) {
            (Some(policy), _) => policy,
            (None, Some(false)) => FailurePolicy::CollectAll,
            (None, _) => FailurePolicy::FailFast,
        }
    }
}

/// Hands out default action ids, suffixing `#n` on collisions within a batch.
#[derive(Debug, Default)]
struct ActionIds {
    seen: Mutex<HashMap<String, usize>>,
}

impl ActionIds {
    fn assign(&self, action: &ToolAction) -> String {
        if let Some(id) = &action.id {
            return id.clone();
        }
        let base = format!("{}:{}", action.name, chrono::Utc::now().timestamp_millis());
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let count = seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}#{count}")
        }
    }
}

/// Owns the registry and the approval service for one agent session.
pub struct ToolOrchestrator {
    registry: ToolRegistry,
    approvals: Arc<dyn ApprovalManager>,
    max_result_chars: usize,
}

impl ToolOrchestrator {
    /// The output threshold comes from `MEMO_TOOL_RESULT_MAX_CHARS` when set.
    pub fn new(registry: ToolRegistry, approvals: Arc<dyn ApprovalManager>) -> Self {
        Self {
            registry,
            approvals,
            max_result_chars: max_result_chars_from_env().unwrap_or(DEFAULT_MAX_RESULT_CHARS),
        }
    }

    pub fn with_max_result_chars(mut self, max_result_chars: usize) -> Self {
        self.max_result_chars = max_result_chars.max(1);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[must_use]
    pub fn approvals(&self) -> &Arc<dyn ApprovalManager> {
        &self.approvals
    }

    #[must_use]
    pub fn max_result_chars(&self) -> usize {
        self.max_result_chars
    }

    /// Run one action. Failures come back as results, never as `Err`.
    ///
    /// The call is its own turn: unused once grants are dropped afterwards.
    pub async fn execute_action(
        &self,
        action: &ToolAction,
        hooks: &dyn ApprovalHooks,
    ) -> ToolActionResult {
        let result = self.run_action(action, hooks, &ActionIds::default()).await;
        self.approvals.clear_once_approvals();
        result
    }

    /// Run a batch under `options`; results keep input order. Once grants do not
    /// outlive the batch.
    pub async fn execute_actions(
        &self,
        actions: &[ToolAction],
        options: &ExecuteOptions,
        hooks: &dyn ApprovalHooks,
    ) -> ToolExecutionResult {
        let mode = options.execution_mode;
        let policy = options.resolved_failure_policy();
        let ids = ActionIds::default();
        tracing::debug!(count = actions.len(), ?mode, ?policy, "Executing tool batch");

        let results = match mode {
            ExecutionMode::Sequential => {
                let mut results = Vec::with_capacity(actions.len());
                for action in actions {
                    let result = self.run_action(action, hooks, &ids).await;
                    let rejected = result.is_rejected();
                    results.push(result);
                    if rejected && policy == FailurePolicy::FailFast {
                        break;
                    }
                }
                results
            }
            ExecutionMode::Parallel => {
                let mut results =
                    join_all(actions.iter().map(|action| self.run_action(action, hooks, &ids)))
                        .await;
                // Everything already ran; only the reported tail is dropped.
                if policy == FailurePolicy::FailFast
                    && let Some(pos) = results.iter().position(ToolActionResult::is_rejected)
                {
                    results.truncate(pos + 1);
                }
                results
            }
        };

        self.approvals.clear_once_approvals();
        ToolExecutionResult::from_results(results, mode, policy)
    }

    async fn run_action(
        &self,
        action: &ToolAction,
        hooks: &dyn ApprovalHooks,
        ids: &ActionIds,
    ) -> ToolActionResult {
        let started = Instant::now();
        let action_id = ids.assign(action);
        let name = action.name.as_str();
        let finish = |result: ToolActionResult| {
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            result.with_duration_ms(elapsed)
        };

        let tool = self.registry.lookup(name);
        let normalized = normalize_input(&action.input);

        if !matches!(&tool, Ok(tool) if tool.kind() == ToolKind::SubAgent) {
            // Unparseable input is still shown to the approver as given.
            let subject = normalized.as_ref().unwrap_or(&action.input);
            let check = self.approvals.check(name, subject);
            if check.need_approval {
                let request = ApprovalRequest::from_check(action_id.clone(), &check);
                hooks.on_approval_request(&request);
                let decision = hooks.request_approval(&request).await;
                self.approvals.record_decision(&check.fingerprint, decision);
                hooks.on_approval_response(&ApprovalResponse {
                    action_id: action_id.clone(),
                    fingerprint: check.fingerprint.clone(),
                    decision,
                });
                if decision.is_deny() {
                    tracing::warn!(%action_id, tool = name, reason = %check.reason, "Tool call denied");
                    return finish(ToolActionResult::failure(
                        action_id,
                        name,
                        ToolActionStatus::ApprovalDenied,
                        format!("User denied approval for {name}: {}", check.reason),
                    ));
                }
            }
        }

        let tool = match tool {
            Ok(tool) => tool,
            Err(e) => {
                tracing::debug!(%action_id, tool = name, "Tool not found");
                return finish(ToolActionResult::failure(
                    action_id,
                    name,
                    ToolActionStatus::ToolNotFound,
                    e.to_string(),
                ));
            }
        };

        let input = match normalized {
            Ok(input) => input,
            Err(message) => {
                return finish(ToolActionResult::failure(
                    action_id,
                    name,
                    ToolActionStatus::InputInvalid,
                    message,
                ));
            }
        };

        let input = match tool.validate_input(input) {
            Ok(input) if input.is_object() => input,
            Ok(_) => {
                return finish(ToolActionResult::failure(
                    action_id,
                    name,
                    ToolActionStatus::InputInvalid,
                    format!("Invalid input for {name}: validated input must be a JSON object"),
                ));
            }
            Err(e) => {
                return finish(ToolActionResult::failure(
                    action_id,
                    name,
                    ToolActionStatus::InputInvalid,
                    format!("Invalid input for {name}: {e}"),
                ));
            }
        };

        tracing::debug!(%action_id, tool = name, "Dispatching tool");
        match tool.execute(input).await {
            Ok(result) => {
                let guarded = guard_output(name, result, self.max_result_chars);
                let text = guarded.joined_text();
                let observation = if text.is_empty() {
                    NO_OUTPUT.to_string()
                } else {
                    text
                };
                finish(ToolActionResult::success(action_id, name, observation))
            }
            Err(e) => {
                let status = classify_tool_error(&e);
                tracing::warn!(%action_id, tool = name, %status, "Tool execution failed: {e}");
                finish(ToolActionResult::failure(
                    action_id,
                    name,
                    status,
                    format!("Tool execution failed: {e}"),
                ))
            }
        }
    }
}

/// Turn a raw action input into a JSON object.
///
/// Strings are parsed as JSON, falling back to the trimmed text; an empty string or
/// null means `{}`.
fn normalize_input(raw: &Value) -> Result<Value, String> {
    let candidate = match raw {
        Value::Null => Value::Object(Map::new()),
        Value::String(text) => {
            let len = text.chars().count();
            if len > MAX_INPUT_CHARS {
                return Err(format!(
                    "Input is {len} characters; the limit is {MAX_INPUT_CHARS}"
                ));
            }
            if text.trim().is_empty() {
                Value::Object(Map::new())
            } else {
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.trim().to_string()))
            }
        }
        other => other.clone(),
    };
    if candidate.is_object() {
        Ok(candidate)
    } else {
        Err(format!("Input must be a JSON object, got: {candidate}"))
    }
}
