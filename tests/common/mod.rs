//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use toolhost_engine::{ApprovalPolicy, PolicyApprovalManager, ToolOrchestrator};
use toolhost_exec::{CommandBlacklist, ExecSessionManager, ExecSettings, ShellConfig};
use toolhost_tools::{ToolRegistry, register_builtins};
use toolhost_types::ApprovalMode;

/// Settings that run commands through `/bin/sh -c`.
pub fn sh_settings() -> ExecSettings {
    ExecSettings {
        shell: ShellConfig {
            binary: Some("/bin/sh".to_string()),
            login: Some(false),
        },
        ..ExecSettings::default()
    }
}

pub fn sessions() -> Arc<ExecSessionManager> {
    let guard = CommandBlacklist::with_defaults().unwrap();
    Arc::new(ExecSessionManager::new(sh_settings(), Arc::new(guard)))
}

/// An orchestrator wired with the built-in tools over a scratch directory.
pub struct Harness {
    pub dir: TempDir,
    pub sessions: Arc<ExecSessionManager>,
    pub orchestrator: ToolOrchestrator,
}

impl Harness {
    pub fn new(mode: ApprovalMode) -> Self {
        Self::with_denylist(mode, &[])
    }

    pub fn with_denylist(mode: ApprovalMode, denylist: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let sessions = sessions();

        let mut registry = ToolRegistry::default();
        register_builtins(&mut registry, &sessions, dir.path()).unwrap();

        let policy = ApprovalPolicy {
            mode,
            denylist: denylist.iter().map(|s| (*s).to_string()).collect::<HashSet<_>>(),
        };
        let approvals = Arc::new(PolicyApprovalManager::new(policy, &registry));
        let orchestrator =
            ToolOrchestrator::new(registry, approvals).with_max_result_chars(12_000);

        Self {
            dir,
            sessions,
            orchestrator,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// Wrap patch body lines in the begin/end markers.
pub fn patch(body: &str) -> String {
    format!("*** Begin Patch\n{body}\n*** End Patch")
}
