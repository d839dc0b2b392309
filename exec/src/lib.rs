//! Long-lived command sessions.
//!
//! `start` spawns a shell command in its own process group and waits up to a yield
//! window. Output that arrived by then comes back in a text envelope along with the
//! exit code, or with a session id if the command is still running. `write` feeds
//! stdin to a running session and returns the output produced since the last call.

mod config;
mod guard;
mod manager;
mod process;
mod response;
mod session;
mod shell;

use std::io;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub use config::{
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MAX_SESSIONS, DEFAULT_WRITE_YIELD_MS, DEFAULT_YIELD_MS,
    ExecSettings, ShellConfig,
};
pub use guard::{AllowAll, CommandBlacklist, CommandGuard, DEFAULT_PATTERNS};
pub use manager::ExecSessionManager;
pub use session::SessionSnapshot;
pub use shell::{ShellInvocation, resolve_shell};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("cmd must not be empty")]
    EmptyCommand,
    #[error("Too many exec sessions ({limit} active). Terminate one before starting another.")]
    TooManySessions { limit: usize },
    #[error("Unknown session id {id}")]
    UnknownSession { id: u32 },
    #[error("Command timed out after {timeout_ms} ms: {command}")]
    TimedOut { command: String, timeout_ms: u64 },
    #[error("Failed to write to stdin of session {id}: {source}")]
    Stdin {
        id: u32,
        #[source]
        source: io::Error,
    },
    #[error("Failed to compile blacklist patterns: {source}")]
    InvalidBlacklist {
        #[source]
        source: regex::Error,
    },
}

/// Arguments of `exec_command`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecCommandRequest {
    pub cmd: String,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub shell: Option<String>,
    /// Defaults to true (`-lc`) for POSIX shells.
    #[serde(default)]
    pub login: Option<bool>,
    #[serde(default)]
    pub yield_time_ms: Option<u64>,
    #[serde(default)]
    pub max_output_tokens: Option<usize>,
    /// Hard limit on the command's lifetime.
    #[serde(default)]
    pub execution_timeout_ms: Option<u64>,
}

impl ExecCommandRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
    }
}

/// Arguments of `write_stdin`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WriteStdinRequest {
    pub session_id: u32,
    /// Empty polls for output without writing.
    #[serde(default)]
    pub chars: String,
    #[serde(default)]
    pub yield_time_ms: Option<u64>,
    #[serde(default)]
    pub max_output_tokens: Option<usize>,
}
