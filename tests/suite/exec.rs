//! Exec session runtime driven through the public manager API.

use std::path::Path;
use std::time::Duration;

use toolhost_exec::{ExecCommandRequest, ExecError, WriteStdinRequest};

use crate::common::sessions;

fn session_id(envelope: &str) -> u32 {
    envelope
        .lines()
        .find_map(|line| line.strip_prefix("Process running with session ID "))
        .and_then(|id| id.trim().parse().ok())
        .unwrap_or_else(|| panic!("no running session in:\n{envelope}"))
}

fn output(envelope: &str) -> &str {
    envelope
        .split_once("Output:\n")
        .map(|(_, out)| out)
        .unwrap_or_default()
}

#[tokio::test]
async fn interactive_session_round_trip() {
    let manager = sessions();
    let mut request = ExecCommandRequest::new("read line; echo got:$line; read again; echo bye");
    request.yield_time_ms = Some(200);
    let started = manager.start(request).await.unwrap();
    let id = session_id(&started);

    let reply = manager
        .write(WriteStdinRequest {
            session_id: id,
            chars: "first\n".to_string(),
            yield_time_ms: Some(500),
            ..WriteStdinRequest::default()
        })
        .await
        .unwrap();
    assert!(output(&reply).contains("got:first"), "{reply}");

    let last = manager
        .write(WriteStdinRequest {
            session_id: id,
            chars: "second\n".to_string(),
            yield_time_ms: Some(2_000),
            ..WriteStdinRequest::default()
        })
        .await
        .unwrap();
    assert!(last.contains("Process exited with code 0"), "{last}");
    // Earlier output is never delivered twice.
    assert!(!output(&last).contains("got:first"));
    assert!(output(&last).contains("bye"));
}

#[tokio::test]
async fn polling_with_empty_chars_drains_new_output() {
    let manager = sessions();
    let mut request = ExecCommandRequest::new("echo one; sleep 0.4; echo two");
    request.yield_time_ms = Some(100);
    let started = manager.start(request).await.unwrap();
    let id = session_id(&started);
    assert!(output(&started).contains("one"));

    tokio::time::sleep(Duration::from_millis(600)).await;
    let polled = manager
        .write(WriteStdinRequest {
            session_id: id,
            yield_time_ms: Some(1_000),
            ..WriteStdinRequest::default()
        })
        .await
        .unwrap();
    assert!(output(&polled).contains("two"), "{polled}");
    assert!(!output(&polled).contains("one"));
}

#[tokio::test]
async fn write_to_unknown_session_errors() {
    let manager = sessions();
    let err = manager
        .write(WriteStdinRequest {
            session_id: 99,
            ..WriteStdinRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::UnknownSession { id: 99 }));
}

#[tokio::test]
async fn workdir_is_honored() {
    let manager = sessions();
    let dir = tempfile::tempdir().unwrap();
    let mut request = ExecCommandRequest::new("pwd");
    request.workdir = Some(dir.path().to_path_buf());
    let envelope = manager.start(request).await.unwrap();
    let printed = output(&envelope).trim().to_string();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(Path::new(&printed).canonicalize().unwrap(), expected);
}

#[tokio::test]
async fn terminate_forgets_the_session() {
    let manager = sessions();
    let mut request = ExecCommandRequest::new("sleep 30");
    request.yield_time_ms = Some(50);
    let started = manager.start(request).await.unwrap();
    let id = session_id(&started);
    assert!(manager.sessions().iter().any(|s| s.id == id && !s.exited));

    manager.terminate(id).await.unwrap();
    assert!(manager.sessions().iter().all(|s| s.id != id));
    let err = manager
        .write(WriteStdinRequest {
            session_id: id,
            ..WriteStdinRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::UnknownSession { .. }));
}
