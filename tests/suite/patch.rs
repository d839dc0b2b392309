//! Patch engine against real files, directly and through the `apply_patch` tool.

use std::fs;

use serde_json::json;
use toolhost_engine::NoHooks;
use toolhost_patch::{FileChange, PatchError, apply_patch};
use toolhost_types::{ApprovalMode, ToolAction, ToolActionStatus};

use crate::common::{Harness, patch};

#[test]
fn multi_file_patch_applies_every_operation() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("lib.rs"), "fn a() {\n    1\n}\n\nfn b() {\n    1\n}\n").unwrap();
    fs::write(dir.path().join("old.txt"), "bye\n").unwrap();

    let summary = apply_patch(
        &patch(
            "*** Add File: docs/README.md\n+# Title\n+body\n\
             *** Update File: lib.rs\n@@ fn b() {\n-    1\n+    2\n\
             *** Delete File: old.txt",
        ),
        dir.path(),
    )
    .unwrap();

    assert_eq!(
        summary.changes,
        vec![
            ("docs/README.md".to_string(), FileChange::Added),
            ("lib.rs".to_string(), FileChange::Modified),
            ("old.txt".to_string(), FileChange::Deleted),
        ]
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("docs/README.md")).unwrap(),
        "# Title\nbody\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("lib.rs")).unwrap(),
        "fn a() {\n    1\n}\n\nfn b() {\n    2\n}\n"
    );
    assert!(!dir.path().join("old.txt").exists());
    assert_eq!(
        summary.to_string(),
        "Success. Updated the following files:\nA docs/README.md\nM lib.rs\nD old.txt"
    );
}

#[test]
fn failed_hunk_leaves_every_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("keep.txt"), "alpha\n").unwrap();

    let err = apply_patch(
        &patch("*** Add File: new.txt\n+new\n*** Update File: keep.txt\n@@\n-gamma\n+delta"),
        dir.path(),
    )
    .unwrap_err();

    assert!(matches!(err, PatchError::ContextNotFound { .. }), "{err}");
    assert!(!dir.path().join("new.txt").exists());
    assert_eq!(fs::read_to_string(dir.path().join("keep.txt")).unwrap(), "alpha\n");
}

#[test]
fn typographic_punctuation_still_matches() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("quote.txt"), "say \u{201C}hi\u{201D} \u{2014} ok\n").unwrap();

    apply_patch(
        &patch("*** Update File: quote.txt\n@@\n-say \"hi\" - ok\n+say hello"),
        dir.path(),
    )
    .unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("quote.txt")).unwrap(), "say hello\n");
}

#[tokio::test]
async fn tool_reports_patch_errors_as_output() {
    let h = Harness::new(ApprovalMode::Auto);
    let action = ToolAction::new("apply_patch", json!({"patch": "*** Add File: a.txt\n+a"}));
    let result = h.orchestrator.execute_action(&action, &NoHooks).await;

    // The tool ran; the failure is in its output, not in the status.
    assert_eq!(result.status(), ToolActionStatus::Success);
    assert!(
        result.observation().starts_with("apply_patch: Invalid patch"),
        "{}",
        result.observation()
    );
    assert!(!h.root().join("a.txt").exists());
}

#[tokio::test]
async fn tool_applies_relative_to_root() {
    let h = Harness::new(ApprovalMode::Auto);
    let action = ToolAction::new(
        "apply_patch",
        json!({"input": patch("*** Add File: src/new.rs\n+pub fn f() {}")}),
    );
    let result = h.orchestrator.execute_action(&action, &NoHooks).await;

    assert_eq!(result.status(), ToolActionStatus::Success);
    assert!(result.observation().contains("A src/new.rs"));
    assert_eq!(
        fs::read_to_string(h.root().join("src/new.rs")).unwrap(),
        "pub fn f() {}\n"
    );
}
