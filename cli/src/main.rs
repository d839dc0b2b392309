//! toolhost CLI - batch runner for the tool orchestrator.
//!
//! Reads a JSON action batch from a file or stdin, executes it, and prints the
//! `ToolExecutionResult` as JSON on stdout. Logs go to stderr.
//!
//! ```text
//! toolhost [--approve once|session|deny] [--root DIR] [BATCH.json | -]
//! ```
//!
//! A batch is either a bare array of actions or an object:
//!
//! ```json
//! { "actions": [{ "name": "exec_command", "input": { "cmd": "ls" } }],
//!   "options": { "executionMode": "parallel", "failurePolicy": "collect_all" } }
//! ```

use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use toolhost_config::{Settings, ToolhostConfig};
use toolhost_engine::{
    ApprovalManager, ApprovalPolicy, ExecuteOptions, PolicyApprovalManager, StaticDecisionHooks,
    ToolOrchestrator,
};
use toolhost_exec::{CommandBlacklist, ExecSessionManager};
use toolhost_tools::{ToolRegistry, register_builtins};
use toolhost_types::{ApprovalDecision, ToolAction};

const USAGE: &str = "usage: toolhost [--approve once|session|deny] [--root DIR] [BATCH.json | -]";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries the result JSON.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    approve: ApprovalDecision,
    root: Option<PathBuf>,
    /// `None` reads stdin.
    batch: Option<PathBuf>,
}

fn parse_decision(raw: &str) -> Result<ApprovalDecision> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "once" => Ok(ApprovalDecision::Once),
        "session" => Ok(ApprovalDecision::Session),
        "deny" => Ok(ApprovalDecision::Deny),
        other => bail!("unknown approval decision '{other}' (expected once, session, or deny)"),
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args {
        approve: ApprovalDecision::Deny,
        root: None,
        batch: None,
    };
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--approve" => {
                let value = args.next().ok_or_else(|| anyhow!("--approve needs a value"))?;
                parsed.approve = parse_decision(&value)?;
            }
            "--root" => {
                let value = args.next().ok_or_else(|| anyhow!("--root needs a value"))?;
                parsed.root = Some(PathBuf::from(value));
            }
            "-h" | "--help" => bail!("{USAGE}"),
            "-" => parsed.batch = None,
            other if other.starts_with("--") => bail!("unknown flag {other}\n{USAGE}"),
            path => {
                if parsed.batch.is_some() {
                    bail!("more than one batch file given\n{USAGE}");
                }
                parsed.batch = Some(PathBuf::from(path));
            }
        }
    }
    Ok(parsed)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchInput {
    Actions(Vec<ToolAction>),
    Batch {
        actions: Vec<ToolAction>,
        #[serde(default)]
        options: Option<ExecuteOptions>,
    },
}

impl BatchInput {
    /// Options given in the batch win; otherwise the configured defaults apply.
    fn into_parts(self, settings: &Settings) -> (Vec<ToolAction>, ExecuteOptions) {
        let configured = ExecuteOptions {
            execution_mode: settings.execution_mode,
            failure_policy: Some(settings.failure_policy),
            stop_on_rejection: None,
        };
        match self {
            BatchInput::Actions(actions) => (actions, configured),
            BatchInput::Batch { actions, options } => (actions, options.unwrap_or(configured)),
        }
    }
}

fn read_batch(path: Option<&PathBuf>) -> Result<BatchInput> {
    let text = match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read batch {}", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read batch from stdin")?;
            text
        }
    };
    serde_json::from_str(&text).context("batch is not a valid action list")
}

fn load_settings() -> Settings {
    // A broken config file is logged by the loader and treated as absent.
    ToolhostConfig::load()
        .ok()
        .flatten()
        .unwrap_or_default()
        .resolve()
}

fn build_orchestrator(settings: &Settings, root: PathBuf) -> Result<ToolOrchestrator> {
    let guard = CommandBlacklist::with_defaults().context("invalid command blacklist")?;
    let sessions = Arc::new(ExecSessionManager::new(
        settings.exec.clone(),
        Arc::new(guard),
    ));

    let mut registry = ToolRegistry::default();
    register_builtins(&mut registry, &sessions, root)?;

    let policy = ApprovalPolicy {
        mode: settings.approval_mode,
        denylist: settings.denylist.clone(),
    };
    let approvals = Arc::new(PolicyApprovalManager::new(policy, &registry));

    let orchestrator = ToolOrchestrator::new(registry, approvals);
    Ok(match settings.max_result_chars {
        Some(max) => orchestrator.with_max_result_chars(max),
        None => orchestrator,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = parse_args(env::args().skip(1))?;
    let settings = load_settings();
    let root = match args.root.clone() {
        Some(root) => root,
        None => env::current_dir().context("failed to resolve working directory")?,
    };

    let (actions, options) = read_batch(args.batch.as_ref())?.into_parts(&settings);
    let orchestrator = build_orchestrator(&settings, root)?;
    tracing::info!(
        actions = actions.len(),
        approval_mode = ?settings.approval_mode,
        "Running batch"
    );

    let hooks = StaticDecisionHooks(args.approve);
    let result = orchestrator.execute_actions(&actions, &options, &hooks).await;
    orchestrator.approvals().dispose();

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;
    use toolhost_config::ToolhostConfig;
    use toolhost_types::{ApprovalDecision, ExecutionMode, FailurePolicy};

    use super::{BatchInput, parse_args};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_flags_and_batch_path() {
        let parsed =
            parse_args(args(&["--approve", "Session", "--root", "/tmp/w", "batch.json"])).unwrap();
        assert_eq!(parsed.approve, ApprovalDecision::Session);
        assert_eq!(parsed.root, Some(PathBuf::from("/tmp/w")));
        assert_eq!(parsed.batch, Some(PathBuf::from("batch.json")));

        let stdin = parse_args(args(&["-"])).unwrap();
        assert_eq!(stdin.approve, ApprovalDecision::Deny);
        assert_eq!(stdin.batch, None);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(args(&["--approve", "always"])).is_err());
        assert!(parse_args(args(&["--approve"])).is_err());
        assert!(parse_args(args(&["--verbose"])).is_err());
        assert!(parse_args(args(&["a.json", "b.json"])).is_err());
    }

    #[test]
    fn bare_array_uses_configured_options() {
        let settings = ToolhostConfig::parse(
            "[orchestrator]\nexecution_mode = \"parallel\"\n",
            std::path::Path::new("config.toml"),
        )
        .unwrap()
        .resolve_with(|_| None);
        let batch: BatchInput =
            serde_json::from_value(json!([{ "name": "exec_command", "input": { "cmd": "ls" } }]))
                .unwrap();
        let (actions, options) = batch.into_parts(&settings);
        assert_eq!(actions.len(), 1);
        assert_eq!(options.execution_mode, ExecutionMode::Parallel);
        assert_eq!(options.resolved_failure_policy(), FailurePolicy::FailFast);
    }

    #[test]
    fn batch_options_override_config() {
        let settings = ToolhostConfig::default().resolve_with(|_| None);
        let batch: BatchInput = serde_json::from_value(json!({
            "actions": [{ "id": "a", "name": "apply_patch", "input": "{}" }],
            "options": { "failurePolicy": "collect_all" }
        }))
        .unwrap();
        let (actions, options) = batch.into_parts(&settings);
        assert_eq!(actions[0].id.as_deref(), Some("a"));
        assert_eq!(options.execution_mode, ExecutionMode::Sequential);
        assert_eq!(options.resolved_failure_policy(), FailurePolicy::CollectAll);
    }
}
