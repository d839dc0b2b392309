use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::ExecSettings;
use crate::guard::{CommandBlacklist, CommandGuard};
use crate::process::Signal;
use crate::response::render;
use crate::session::{ExecSession, SessionSnapshot, lock};
use crate::shell::resolve_shell;
use crate::{ExecCommandRequest, ExecError, WriteStdinRequest};

/// Table of exec sessions keyed by numeric id.
///
/// Ids start at 1 and are never reused within a manager. At most
/// `settings.max_sessions` sessions are retained; exited sessions are evicted oldest
/// first to make room, live ones never are. Dropping the manager kills every process
/// it still owns.
pub struct ExecSessionManager {
    settings: ExecSettings,
    guard: Arc<dyn CommandGuard>,
    sessions: Mutex<BTreeMap<u32, Arc<ExecSession>>>,
    next_id: AtomicU32,
}

impl ExecSessionManager {
    pub fn new(settings: ExecSettings, guard: Arc<dyn CommandGuard>) -> Self {
        Self {
            settings,
            guard,
            sessions: Mutex::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Default settings guarded by the default blacklist.
    pub fn with_defaults() -> Result<Self, ExecError> {
        Ok(Self::new(
            ExecSettings::default(),
            Arc::new(CommandBlacklist::with_defaults()?),
        ))
    }

    #[must_use]
    pub fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    /// Spawn `request.cmd` and return the envelope for whatever it produced within the
    /// yield window.
    pub async fn start(&self, request: ExecCommandRequest) -> Result<String, ExecError> {
        let call_started = Instant::now();
        if request.cmd.trim().is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        self.make_room()?;
        if let Some(message) = self.guard.check(&request.cmd, None) {
            return Ok(message);
        }

        let invocation = resolve_shell(
            request.shell.as_deref(),
            &self.settings.shell,
            request.login,
            &request.cmd,
        );
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(ExecSession::spawn(
            id,
            &request.cmd,
            &invocation,
            request.workdir.as_deref(),
        ));
        lock(&self.sessions).insert(id, Arc::clone(&session));

        let yield_window =
            Duration::from_millis(request.yield_time_ms.unwrap_or(self.settings.default_yield_ms));
        let limit = request.execution_timeout_ms.map(Duration::from_millis);
        let wait = limit.map_or(yield_window, |limit| limit.min(yield_window));
        let exited = session.wait_for_exit(wait).await;

        if let Some(limit) = limit
            && !exited
        {
            if session.started_at.elapsed() >= limit {
                session.terminate().await;
                self.remove(id);
                tracing::warn!(session_id = id, timeout_ms = limit.as_millis(), "Exec command timed out");
                return Err(ExecError::TimedOut {
                    command: request.cmd,
                    timeout_ms: request.execution_timeout_ms.unwrap_or_default(),
                });
            }
            spawn_watchdog(&session, limit);
        }

        Ok(self.respond(&session, call_started, request.max_output_tokens))
    }

    /// Write `request.chars` to a session's stdin and return the output produced since
    /// the previous call. Empty `chars` just polls.
    pub async fn write(&self, request: WriteStdinRequest) -> Result<String, ExecError> {
        let call_started = Instant::now();
        let session = self.get(request.session_id)?;
        if !request.chars.is_empty()
            && !session.is_exited()
            && let Some(message) = session
                .send_input(&request.chars, self.guard.as_ref())
                .await?
        {
            return Ok(message);
        }

        let yield_window =
            Duration::from_millis(request.yield_time_ms.unwrap_or(self.settings.write_yield_ms));
        session.wait_for_exit(yield_window).await;
        Ok(self.respond(&session, call_started, request.max_output_tokens))
    }

    /// Stop a session's process group (SIGTERM, then SIGKILL) and forget it.
    pub async fn terminate(&self, id: u32) -> Result<(), ExecError> {
        let session = self.get(id)?;
        session.terminate().await;
        self.remove(id);
        tracing::info!(session_id = id, "Terminated exec session");
        Ok(())
    }

    /// Sessions currently retained, ordered by id.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        lock(&self.sessions)
            .values()
            .map(|session| session.snapshot())
            .collect()
    }

    /// Kill every live process and clear the table.
    pub fn shutdown(&self) {
        let drained = std::mem::take(&mut *lock(&self.sessions));
        for session in drained.values().filter(|s| !s.is_exited()) {
            session.signal(Signal::Kill);
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Shut down exec sessions");
        }
    }

    fn get(&self, id: u32) -> Result<Arc<ExecSession>, ExecError> {
        lock(&self.sessions)
            .get(&id)
            .cloned()
            .ok_or(ExecError::UnknownSession { id })
    }

    fn remove(&self, id: u32) {
        lock(&self.sessions).remove(&id);
    }

    fn make_room(&self) -> Result<(), ExecError> {
        let limit = self.settings.max_sessions.max(1);
        let mut sessions = lock(&self.sessions);
        while sessions.len() >= limit {
            let oldest_exited = sessions
                .values()
                .filter_map(|s| s.exited_at().map(|at| (at, s.id)))
                .min();
            let Some((_, id)) = oldest_exited else {
                break;
            };
            sessions.remove(&id);
            tracing::debug!(session_id = id, "Evicted exited exec session");
        }
        if sessions.len() >= limit {
            return Err(ExecError::TooManySessions { limit });
        }
        Ok(())
    }

    fn respond(
        &self,
        session: &ExecSession,
        call_started: Instant,
        max_output_tokens: Option<usize>,
    ) -> String {
        let max_chars = max_output_tokens
            .unwrap_or(self.settings.max_output_tokens)
            .saturating_mul(4);
        let chunk = session.take_chunk(max_chars);
        render(&chunk, call_started.elapsed())
    }
}

impl Drop for ExecSessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Enforce `limit` on a session that outlived its first yield window.
fn spawn_watchdog(session: &Arc<ExecSession>, limit: Duration) {
    let weak = Arc::downgrade(session);
    let remaining = limit.saturating_sub(session.started_at.elapsed());
    tokio::spawn(async move {
        tokio::time::sleep(remaining).await;
        let Some(session) = weak.upgrade() else {
            return;
        };
        if session.is_exited() {
            return;
        }
        tracing::warn!(session_id = session.id, timeout_ms = limit.as_millis(), "Exec command timed out");
        session.append_notice(&format!(
            "\n[Command timed out after {} ms]\n",
            limit.as_millis()
        ));
        session.terminate().await;
    });
}
