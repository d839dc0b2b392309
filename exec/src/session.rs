//! A single spawned command and its output buffer.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::task::JoinHandle;
use toolhost_types::text::{estimate_tokens, prefix_chars};

use crate::ExecError;
use crate::guard::CommandGuard;
use crate::process::{Signal, set_new_session, signal_process_group};
use crate::response::{ChunkStatus, OutputChunk};
use crate::shell::ShellInvocation;

/// Grace period between SIGTERM and SIGKILL, and after SIGKILL.
pub(crate) const ESCALATION_STEP: Duration = Duration::from_millis(200);
/// How long the waiter lets pipe readers drain after the child exits.
const READER_DRAIN: Duration = Duration::from_millis(500);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct OutputState {
    /// Append-only.
    buffer: String,
    /// Byte offset of the first undelivered character. Only moves forward.
    read_offset: usize,
    exited: bool,
    exit_code: Option<i32>,
    exited_at: Option<Instant>,
}

impl OutputState {
    fn mark_exited(&mut self, exit_code: Option<i32>) {
        self.exited = true;
        self.exit_code = exit_code;
        self.exited_at = Some(Instant::now());
    }

    /// Undelivered output up to `max_chars`, advancing `read_offset` past it.
    fn take_delta(&mut self, max_chars: usize) -> (String, usize) {
        let pending = &self.buffer[self.read_offset..];
        let original_token_count = estimate_tokens(pending);
        let delivered = prefix_chars(pending, max_chars).to_string();
        self.read_offset += delivered.len();
        (delivered, original_token_count)
    }
}

#[derive(Debug)]
struct StdinState {
    stdin: Option<ChildStdin>,
    /// Input after the last newline, kept so the guard always sees whole lines.
    pending: String,
}

/// Point-in-time view of a session for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: u32,
    pub command: String,
    pub exited: bool,
    pub exit_code: Option<i32>,
    pub started_at: SystemTime,
}

pub(crate) struct ExecSession {
    pub(crate) id: u32,
    command: String,
    pub(crate) started_at: Instant,
    started_wall: SystemTime,
    output: Arc<Mutex<OutputState>>,
    exit_rx: watch::Receiver<bool>,
    stdin: AsyncMutex<StdinState>,
    /// Dropping the sender makes the waiter kill the process group.
    signals: Option<mpsc::UnboundedSender<Signal>>,
}

impl ExecSession {
    /// Spawn `invocation`. A spawn failure still yields a session: already exited,
    /// with the error text as its output.
    pub(crate) fn spawn(
        id: u32,
        command: &str,
        invocation: &ShellInvocation,
        workdir: Option<&Path>,
    ) -> Self {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        set_new_session(&mut cmd);

        let output = Arc::new(Mutex::new(OutputState::default()));
        let (exit_tx, exit_rx) = watch::channel(false);

        let (stdin, signals) = match cmd.spawn() {
            Ok(mut child) => {
                tracing::info!(session_id = id, pid = ?child.id(), shell = %invocation, "Spawned exec session");
                let readers = [
                    child
                        .stdout
                        .take()
                        .map(|out| tokio::spawn(read_stream(out, Arc::clone(&output)))),
                    child
                        .stderr
                        .take()
                        .map(|err| tokio::spawn(read_stream(err, Arc::clone(&output)))),
                ]
                .into_iter()
                .flatten()
                .collect();
                let stdin = child.stdin.take();
                let (signal_tx, signal_rx) = mpsc::unbounded_channel();
                tokio::spawn(wait_child(
                    id,
                    child,
                    readers,
                    Arc::clone(&output),
                    exit_tx,
                    signal_rx,
                ));
                (stdin, Some(signal_tx))
            }
            Err(err) => {
                tracing::warn!(session_id = id, shell = %invocation, "Failed to spawn exec session: {err}");
                let mut state = lock(&output);
                state
                    .buffer
                    .push_str(&format!("Failed to start {invocation}: {err}\n"));
                state.mark_exited(None);
                drop(state);
                exit_tx.send_replace(true);
                (None, None)
            }
        };

        Self {
            id,
            command: command.to_string(),
            started_at: Instant::now(),
            started_wall: SystemTime::now(),
            output,
            exit_rx,
            stdin: AsyncMutex::new(StdinState {
                stdin,
                pending: String::new(),
            }),
            signals,
        }
    }

    pub(crate) fn is_exited(&self) -> bool {
        lock(&self.output).exited
    }

    pub(crate) fn exited_at(&self) -> Option<Instant> {
        lock(&self.output).exited_at
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        let state = lock(&self.output);
        SessionSnapshot {
            id: self.id,
            command: self.command.clone(),
            exited: state.exited,
            exit_code: state.exit_code,
            started_at: self.started_wall,
        }
    }

    pub(crate) fn append_notice(&self, notice: &str) {
        lock(&self.output).buffer.push_str(notice);
    }

    /// Wait up to `timeout` for the process to exit. Returns whether it has.
    pub(crate) async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let mut rx = self.exit_rx.clone();
        let _ = tokio::time::timeout(timeout, rx.wait_for(|exited| *exited)).await;
        self.is_exited()
    }

    pub(crate) fn signal(&self, signal: Signal) {
        if let Some(tx) = &self.signals {
            let _ = tx.send(signal);
        }
    }

    /// SIGTERM, grace period, SIGKILL if still alive, grace period.
    pub(crate) async fn terminate(&self) {
        if self.is_exited() {
            return;
        }
        self.signal(Signal::Terminate);
        if self.wait_for_exit(ESCALATION_STEP).await {
            return;
        }
        tracing::warn!(session_id = self.id, "Exec session ignored SIGTERM; killing");
        self.signal(Signal::Kill);
        self.wait_for_exit(ESCALATION_STEP).await;
    }

    /// Delta since the last call, plus the status to report with it.
    pub(crate) fn take_chunk(&self, max_chars: usize) -> OutputChunk {
        let mut state = lock(&self.output);
        let (output, original_token_count) = state.take_delta(max_chars);
        let status = if state.exited {
            ChunkStatus::Exited(state.exit_code)
        } else {
            ChunkStatus::Running(self.id)
        };
        OutputChunk {
            output,
            original_token_count,
            status,
        }
    }

    /// Feed `chars` to stdin, guarding every line it completes.
    ///
    /// Only whole lines that passed the guard reach the child; a trailing partial line
    /// is held until its newline arrives. Returns the guard's message when a line is
    /// blocked, in which case nothing is written and the held line is dropped.
    pub(crate) async fn send_input(
        &self,
        chars: &str,
        guard: &dyn CommandGuard,
    ) -> Result<Option<String>, ExecError> {
        let mut stdin = self.stdin.lock().await;
        let merged = format!("{}{chars}", stdin.pending);
        let (complete, rest) = match merged.rfind('\n') {
            Some(idx) => merged.split_at(idx + 1),
            None => ("", merged.as_str()),
        };

        for line in complete.split_inclusive('\n') {
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(message) = guard.check(line, Some(self.id)) {
                stdin.pending.clear();
                return Ok(Some(message));
            }
        }
        stdin.pending = rest.to_string();
        if complete.is_empty() {
            return Ok(None);
        }

        let Some(pipe) = stdin.stdin.as_mut() else {
            return Ok(None);
        };
        let written = async {
            pipe.write_all(complete.as_bytes()).await?;
            pipe.flush().await
        }
        .await;
        if let Err(source) = written {
            stdin.stdin = None;
            if source.kind() == io::ErrorKind::BrokenPipe {
                tracing::debug!(session_id = self.id, "Exec session closed stdin");
                return Ok(None);
            }
            return Err(ExecError::Stdin {
                id: self.id,
                source,
            });
        }
        Ok(None)
    }
}

enum WaitEvent {
    Exited(io::Result<ExitStatus>),
    Signal(Option<Signal>),
}

/// Owns the child: relays signals until it exits, then publishes the exit.
async fn wait_child(
    id: u32,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    output: Arc<Mutex<OutputState>>,
    exit_tx: watch::Sender<bool>,
    mut signals: mpsc::UnboundedReceiver<Signal>,
) {
    let status = loop {
        let event = tokio::select! {
            status = child.wait() => WaitEvent::Exited(status),
            signal = signals.recv() => WaitEvent::Signal(signal),
        };
        match event {
            WaitEvent::Exited(status) => break status,
            WaitEvent::Signal(Some(signal)) => {
                if let Err(e) = signal_process_group(&mut child, signal) {
                    tracing::warn!(session_id = id, ?signal, "Failed to signal exec session: {e}");
                }
            }
            WaitEvent::Signal(None) => {
                // Session dropped: nothing may outlive it.
                let _ = signal_process_group(&mut child, Signal::Kill);
                break child.wait().await;
            }
        }
    };

    let drained = tokio::time::timeout(READER_DRAIN, async {
        for reader in readers {
            let _ = reader.await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::debug!(session_id = id, "Output pipes still open after exit");
    }

    let exit_code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            lock(&output)
                .buffer
                .push_str(&format!("Failed to wait for process: {e}\n"));
            None
        }
    };
    lock(&output).mark_exited(exit_code);
    exit_tx.send_replace(true);
    tracing::info!(session_id = id, ?exit_code, "Exec session exited");
}

/// Incremental UTF-8 decoding that holds back sequences split across reads.
#[derive(Debug, Default)]
struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(text) => {
                    out.push_str(text);
                    self.carry.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.carry[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.carry.drain(..valid + bad);
                        }
                        None => {
                            self.carry.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        rest
    }
}

async fn read_stream<R: AsyncRead + Unpin>(mut reader: R, output: Arc<Mutex<OutputState>>) {
    let mut buf = [0u8; 4096];
    let mut decoder = Utf8Decoder::default();
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let text = decoder.push(&buf[..n]);
        if !text.is_empty() {
            lock(&output).buffer.push_str(&text);
        }
    }
    let tail = decoder.finish();
    if !tail.is_empty() {
        lock(&output).buffer.push_str(&tail);
    }
}

#[cfg(test)]
mod tests {
    use super::{OutputState, Utf8Decoder};

    #[test]
    fn decoder_carries_split_sequences() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "héllo".as_bytes();
        // Split inside the two-byte 'é'.
        assert_eq!(decoder.push(&bytes[..2]), "h");
        assert_eq!(decoder.push(&bytes[2..]), "éllo");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(decoder.push(b"\xe2\x82"), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn delta_advances_by_delivered_length_only() {
        let mut state = OutputState {
            buffer: "abcdefgh".into(),
            ..OutputState::default()
        };
        let (first, tokens) = state.take_delta(3);
        assert_eq!(first, "abc");
        assert_eq!(tokens, 2);
        let (second, _) = state.take_delta(100);
        assert_eq!(second, "defgh");
        let (third, tokens) = state.take_delta(100);
        assert_eq!(third, "");
        assert_eq!(tokens, 0);

        state.buffer.push_str("ij");
        assert_eq!(state.take_delta(100).0, "ij");
    }

    #[test]
    fn delta_truncates_on_char_boundary() {
        let mut state = OutputState {
            buffer: "ééé".into(),
            ..OutputState::default()
        };
        assert_eq!(state.take_delta(2).0, "éé");
        assert_eq!(state.take_delta(2).0, "é");
    }
}
