//! Settings for the exec session runtime.

use serde::Deserialize;

pub const DEFAULT_MAX_SESSIONS: usize = 64;
pub const DEFAULT_YIELD_MS: u64 = 10_000;
pub const DEFAULT_WRITE_YIELD_MS: u64 = 250;
pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 2_000;

/// Shell configuration for command execution.
///
/// ```toml
/// [exec.shell]
/// binary = "zsh"
/// login = false
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellConfig {
    /// Override shell binary (e.g., "pwsh", "bash", "/usr/local/bin/fish").
    pub binary: Option<String>,
    /// Run POSIX shells with `-lc` instead of `-c`. Defaults to true.
    pub login: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecSettings {
    /// Sessions retained at once, live or exited.
    pub max_sessions: usize,
    /// Yield window for `start` when the request gives none.
    pub default_yield_ms: u64,
    /// Yield window for `write` when the request gives none.
    pub write_yield_ms: u64,
    pub max_output_tokens: usize,
    pub shell: ShellConfig,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            default_yield_ms: DEFAULT_YIELD_MS,
            write_yield_ms: DEFAULT_WRITE_YIELD_MS,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            shell: ShellConfig::default(),
        }
    }
}
