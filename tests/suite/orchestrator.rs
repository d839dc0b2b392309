//! End-to-end orchestrator runs over the built-in tools.

use std::fs;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use toolhost_engine::{ApprovalFut, ApprovalHooks, ExecuteOptions, NoHooks, StaticDecisionHooks};
use toolhost_types::{
    ApprovalDecision, ApprovalMode, ApprovalRequest, ExecutionMode, FailurePolicy, RiskLevel,
    ToolAction, ToolActionStatus,
};

use crate::common::{Harness, patch};

/// Answers with a fixed decision and counts how often it was asked.
struct CountingHooks {
    asked: AtomicUsize,
    decision: ApprovalDecision,
}

impl CountingHooks {
    fn answering(decision: ApprovalDecision) -> Self {
        Self {
            asked: AtomicUsize::new(0),
            decision,
        }
    }

    fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl ApprovalHooks for CountingHooks {
    fn request_approval<'a>(&'a self, _request: &'a ApprovalRequest) -> ApprovalFut<'a> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        let decision = self.decision;
        Box::pin(async move { decision })
    }
}

/// Records the risk level of the last request.
#[derive(Default)]
struct RiskRecorder {
    last: Mutex<Option<RiskLevel>>,
}

impl ApprovalHooks for RiskRecorder {
    fn on_approval_request(&self, request: &ApprovalRequest) {
        *self.last.lock().unwrap() = Some(request.risk_level);
    }

    fn request_approval<'a>(&'a self, _request: &'a ApprovalRequest) -> ApprovalFut<'a> {
        Box::pin(async { ApprovalDecision::Once })
    }
}

// ========================================================================
// Dispatch
// ========================================================================

#[tokio::test]
async fn unknown_tool_is_reported_not_raised() {
    let h = Harness::new(ApprovalMode::Auto);
    let result = h
        .orchestrator
        .execute_action(&ToolAction::new("web_search", json!({})), &NoHooks)
        .await;
    assert_eq!(result.status(), ToolActionStatus::ToolNotFound);
    assert_eq!(result.error_type(), Some(ToolActionStatus::ToolNotFound));
    assert!(!result.is_success());
}

#[cfg(unix)]
#[tokio::test]
async fn exec_command_runs_through_orchestrator() {
    let h = Harness::new(ApprovalMode::Auto);
    let action = ToolAction::new("exec_command", json!({"cmd": "echo hello"})).with_id("run-1");
    let result = h.orchestrator.execute_action(&action, &NoHooks).await;

    assert_eq!(result.action_id(), "run-1");
    assert_eq!(result.status(), ToolActionStatus::Success);
    assert!(result.observation().contains("Process exited with code 0"));
    assert!(result.observation().contains("hello"));
}

#[cfg(unix)]
#[tokio::test]
async fn string_input_is_parsed_as_json() {
    let h = Harness::new(ApprovalMode::Auto);
    let action = ToolAction::new("exec_command", json!("{\"cmd\": \"echo from-string\"}"));
    let result = h.orchestrator.execute_action(&action, &NoHooks).await;
    assert_eq!(result.status(), ToolActionStatus::Success);
    assert!(result.observation().contains("from-string"));
}

#[tokio::test]
async fn schema_violation_is_input_invalid() {
    let h = Harness::new(ApprovalMode::Auto);
    let result = h
        .orchestrator
        .execute_action(&ToolAction::new("exec_command", json!({"cmd": 5})), &NoHooks)
        .await;
    assert_eq!(result.status(), ToolActionStatus::InputInvalid);
}

#[cfg(unix)]
#[tokio::test]
async fn exec_timeout_is_execution_failed() {
    let h = Harness::new(ApprovalMode::Auto);
    let action = ToolAction::new(
        "exec_command",
        json!({"cmd": "sleep 5", "execution_timeout_ms": 100}),
    );
    let result = h.orchestrator.execute_action(&action, &NoHooks).await;
    assert_eq!(result.status(), ToolActionStatus::ExecutionFailed);
    assert!(result.observation().contains("timed out"), "{}", result.observation());
}

#[cfg(unix)]
#[tokio::test]
async fn dangerous_command_never_runs() {
    let h = Harness::new(ApprovalMode::Auto);
    let action = ToolAction::new("exec_command", json!({"cmd": "rm -rf /"}));
    let result = h.orchestrator.execute_action(&action, &NoHooks).await;
    // The block is reported as tool output, not as a failure.
    assert_eq!(result.status(), ToolActionStatus::Success);
    assert!(result.observation().contains("dangerous_command"));
    assert!(h.sessions.sessions().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn oversized_output_becomes_hint() {
    let h = Harness::new(ApprovalMode::Auto);
    let action = ToolAction::new(
        "exec_command",
        json!({"cmd": "head -c 20000 /dev/zero | tr '\\0' x", "max_output_tokens": 100000}),
    );
    let result = h.orchestrator.execute_action(&action, &NoHooks).await;
    assert_eq!(result.status(), ToolActionStatus::Success);
    assert!(
        result
            .observation()
            .starts_with("<system_hint type=\"tool_output_omitted\" tool=\"exec_command\"")
    );
    assert!(result.observation().contains("max_chars=\"12000\""));
}

// ========================================================================
// Approval
// ========================================================================

#[tokio::test]
async fn default_mode_without_hooks_denies_mutating_tools() {
    let h = Harness::new(ApprovalMode::Default);
    let action = ToolAction::new("apply_patch", json!({"input": patch("*** Add File: a.txt\n+a")}));
    let batch = h
        .orchestrator
        .execute_actions(&[action], &ExecuteOptions::default(), &NoHooks)
        .await;

    assert!(batch.has_rejection);
    assert_eq!(batch.results[0].status(), ToolActionStatus::ApprovalDenied);
    assert!(batch.results[0].is_rejected());
    assert!(!h.root().join("a.txt").exists());
}

#[tokio::test]
async fn session_grant_skips_the_second_prompt() {
    let h = Harness::new(ApprovalMode::Default);
    let hooks = CountingHooks::answering(ApprovalDecision::Session);
    let body = patch("*** Add File: a.txt\n+a");
    let action = ToolAction::new("apply_patch", json!({"input": body}));

    let first = h.orchestrator.execute_action(&action, &hooks).await;
    assert_eq!(first.status(), ToolActionStatus::Success);
    fs::remove_file(h.root().join("a.txt")).unwrap();
    let second = h.orchestrator.execute_action(&action, &hooks).await;
    assert_eq!(second.status(), ToolActionStatus::Success);

    assert_eq!(hooks.asked(), 1);
}

#[tokio::test]
async fn strict_mode_asks_every_time() {
    let h = Harness::new(ApprovalMode::Strict);
    let hooks = CountingHooks::answering(ApprovalDecision::Session);
    let action = ToolAction::new("nonexistent_reader", json!({}));
    // Unknown tools never prompt.
    let _ = h.orchestrator.execute_action(&action, &hooks).await;
    assert_eq!(hooks.asked(), 0);

    let patch_action =
        ToolAction::new("apply_patch", json!({"input": patch("*** Add File: s.txt\n+s")}));
    let _ = h.orchestrator.execute_action(&patch_action, &hooks).await;
    let _ = h.orchestrator.execute_action(&patch_action, &hooks).await;
    assert_eq!(hooks.asked(), 2);
}

#[tokio::test]
async fn denylisted_tool_asks_even_in_auto_mode() {
    let h = Harness::with_denylist(ApprovalMode::Auto, &["apply_patch"]);
    let action = ToolAction::new("apply_patch", json!({"input": patch("*** Add File: d.txt\n+d")}));
    let result = h.orchestrator.execute_action(&action, &NoHooks).await;
    assert_eq!(result.status(), ToolActionStatus::ApprovalDenied);
    assert!(result.observation().contains("denylisted"));
}

#[cfg(unix)]
#[tokio::test]
async fn exec_requests_carry_high_risk() {
    let h = Harness::new(ApprovalMode::Default);
    let recorder = RiskRecorder::default();
    let action = ToolAction::new("exec_command", json!({"cmd": "true"}));
    let result = h.orchestrator.execute_action(&action, &recorder).await;
    assert_eq!(result.status(), ToolActionStatus::Success);
    assert_eq!(*recorder.last.lock().unwrap(), Some(RiskLevel::High));

    let patch_action =
        ToolAction::new("apply_patch", json!({"input": patch("*** Add File: r.txt\n+r")}));
    let _ = h.orchestrator.execute_action(&patch_action, &recorder).await;
    assert_eq!(*recorder.last.lock().unwrap(), Some(RiskLevel::Medium));
}

// ========================================================================
// Batches
// ========================================================================

#[tokio::test]
async fn sequential_fail_fast_stops_after_denial() {
    let h = Harness::new(ApprovalMode::Default);
    let actions = vec![
        ToolAction::new("web_search", json!({})).with_id("missing"),
        ToolAction::new("apply_patch", json!({"input": patch("*** Add File: x.txt\n+x")}))
            .with_id("denied"),
        ToolAction::new("apply_patch", json!({"input": patch("*** Add File: y.txt\n+y")}))
            .with_id("skipped"),
    ];
    let batch = h
        .orchestrator
        .execute_actions(&actions, &ExecuteOptions::default(), &NoHooks)
        .await;

    let ids: Vec<&str> = batch.results.iter().map(|r| r.action_id()).collect();
    assert_eq!(ids, ["missing", "denied"]);
    assert_eq!(batch.failure_policy, FailurePolicy::FailFast);
    assert!(!h.root().join("y.txt").exists());
    assert!(batch.combined_observation.starts_with("[web_search]: "));
}

#[tokio::test]
async fn collect_all_keeps_going_after_denial() {
    let h = Harness::with_denylist(ApprovalMode::Auto, &["write_stdin"]);
    let actions = vec![
        ToolAction::new("write_stdin", json!({"session_id": 1})).with_id("denied"),
        ToolAction::new("apply_patch", json!({"input": patch("*** Add File: y.txt\n+y")}))
            .with_id("ran"),
    ];
    let options = ExecuteOptions {
        failure_policy: Some(FailurePolicy::CollectAll),
        ..ExecuteOptions::default()
    };
    let batch = h.orchestrator.execute_actions(&actions, &options, &NoHooks).await;

    assert_eq!(batch.results.len(), 2);
    assert!(batch.has_rejection);
    assert_eq!(batch.results[1].status(), ToolActionStatus::Success);
    assert_eq!(fs::read_to_string(h.root().join("y.txt")).unwrap(), "y\n");
}

#[cfg(unix)]
#[tokio::test]
async fn parallel_batch_keeps_input_order() {
    let h = Harness::new(ApprovalMode::Auto);
    let actions = vec![
        ToolAction::new("exec_command", json!({"cmd": "sleep 0.3; echo slow"})).with_id("slow"),
        ToolAction::new("exec_command", json!({"cmd": "echo fast"})).with_id("fast"),
    ];
    let options = ExecuteOptions {
        execution_mode: ExecutionMode::Parallel,
        ..ExecuteOptions::default()
    };
    let batch = h.orchestrator.execute_actions(&actions, &options, &NoHooks).await;

    assert_eq!(batch.execution_mode, ExecutionMode::Parallel);
    let ids: Vec<&str> = batch.results.iter().map(|r| r.action_id()).collect();
    assert_eq!(ids, ["slow", "fast"]);
    assert!(batch.results[0].observation().contains("slow"));
    assert!(batch.results.iter().all(|r| r.is_success()));
}

#[tokio::test]
async fn batch_result_serializes_camel_case() {
    let h = Harness::new(ApprovalMode::Auto);
    let batch = h
        .orchestrator
        .execute_actions(
            &[ToolAction::new("nope", json!({})).with_id("n")],
            &ExecuteOptions::default(),
            &StaticDecisionHooks(ApprovalDecision::Once),
        )
        .await;
    let value = serde_json::to_value(&batch).unwrap();
    assert_eq!(value["hasRejection"], json!(false));
    assert_eq!(value["executionMode"], json!("sequential"));
    assert_eq!(value["failurePolicy"], json!("fail_fast"));
    assert_eq!(value["results"][0]["actionId"], json!("n"));
    assert_eq!(value["results"][0]["errorType"], json!("tool_not_found"));
}
