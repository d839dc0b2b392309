//! Configuration for toolhost: `~/.toolhost/config.toml` plus environment overrides.
//!
//! ```toml
//! [approval]
//! mode = "default"          # auto | default | strict
//! denylist = ["exec_command"]
//!
//! [exec]
//! max_sessions = 64
//! default_yield_ms = 10000
//! write_yield_ms = 250
//! max_output_tokens = 2000
//!
//! [exec.shell]
//! binary = "${HOME}/bin/zsh"
//! login = false
//!
//! [orchestrator]
//! max_result_chars = 12000
//! execution_mode = "sequential"   # sequential | parallel
//! failure_policy = "fail_fast"    # fail_fast | collect_all
//! ```

use std::collections::HashSet;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toolhost_exec::ExecSettings;
use toolhost_types::{ApprovalMode, ExecutionMode, FailurePolicy};

pub const APPROVAL_MODE_ENV: &str = "TOOLHOST_APPROVAL_MODE";
pub const MAX_RESULT_CHARS_ENV: &str = "MEMO_TOOL_RESULT_MAX_CHARS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolhostConfig {
    pub approval: Option<ApprovalConfig>,
    pub exec: Option<ExecSettings>,
    pub orchestrator: Option<OrchestratorConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApprovalConfig {
    pub mode: Option<String>,
    #[serde(default)]
    pub denylist: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrchestratorConfig {
    pub max_result_chars: Option<usize>,
    pub execution_mode: Option<ExecutionMode>,
    pub failure_policy: Option<FailurePolicy>,
}

/// Effective settings after defaults and environment overrides.
#[derive(Debug, Clone)]
pub struct Settings {
    pub approval_mode: ApprovalMode,
    pub denylist: HashSet<String>,
    pub exec: ExecSettings,
    /// `None` leaves the orchestrator's default in place.
    pub max_result_chars: Option<usize>,
    pub execution_mode: ExecutionMode,
    pub failure_policy: FailurePolicy,
}

/// Replace `${VAR}` with the variable's value; unset variables become empty.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

impl ToolhostConfig {
    /// Load the config at [`config_path`]. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {}: {}", path.display(), err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        Self::parse(&content, path)
    }

    /// Parse TOML text; `path` is only used for error reporting.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        match toml::from_str::<Self>(content) {
            Ok(mut config) => {
                config.expand_env_vars();
                Ok(config)
            }
            Err(err) => {
                tracing::warn!("Failed to parse config at {}: {}", path.display(), err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    fn expand_env_vars(&mut self) {
        if let Some(approval) = &mut self.approval {
            if let Some(mode) = &mut approval.mode {
                *mode = expand_env_vars(mode);
            }
            for name in &mut approval.denylist {
                *name = expand_env_vars(name);
            }
        }
        if let Some(binary) = self
            .exec
            .as_mut()
            .and_then(|exec| exec.shell.binary.as_mut())
        {
            *binary = expand_env_vars(binary);
        }
    }

    /// Apply defaults and the process environment.
    #[must_use]
    pub fn resolve(self) -> Settings {
        self.resolve_with(|key| env::var(key).ok())
    }

    /// Like [`resolve`](Self::resolve) with an explicit environment lookup.
    pub fn resolve_with(self, lookup: impl Fn(&str) -> Option<String>) -> Settings {
        let approval = self.approval.unwrap_or_default();
        let orchestrator = self.orchestrator.unwrap_or_default();

        let mode_source = lookup(APPROVAL_MODE_ENV).or(approval.mode);
        let approval_mode = match mode_source.as_deref().map(str::parse::<ApprovalMode>) {
            Some(Ok(mode)) => mode,
            Some(Err(message)) => {
                tracing::warn!("{message}; using default approval mode");
                ApprovalMode::default()
            }
            None => ApprovalMode::default(),
        };

        let env_max = lookup(MAX_RESULT_CHARS_ENV).and_then(|raw| {
            let parsed = parse_positive(&raw);
            if parsed.is_none() {
                tracing::warn!(value = %raw, "Ignoring invalid {MAX_RESULT_CHARS_ENV}");
            }
            parsed
        });
        let max_result_chars = env_max.or(orchestrator.max_result_chars.filter(|n| *n > 0));

        Settings {
            approval_mode,
            denylist: approval.denylist.into_iter().collect(),
            exec: self.exec.unwrap_or_default(),
            max_result_chars,
            execution_mode: orchestrator.execution_mode.unwrap_or_default(),
            failure_policy: orchestrator.failure_policy.unwrap_or_default(),
        }
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".toolhost").join("config.toml"))
}
