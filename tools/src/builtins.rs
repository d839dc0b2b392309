//! Built-in tools backed by the exec session runtime and the patch engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use toolhost_exec::{ExecCommandRequest, ExecError, ExecSessionManager, WriteStdinRequest};
use toolhost_types::CallToolResult;

use super::{Tool, ToolError, ToolFut, ToolRegistry, parse_args, require_object, validate_args};

fn exec_error(tool: &str, err: ExecError) -> ToolError {
    match err {
        ExecError::TimedOut { timeout_ms, .. } => ToolError::Timeout {
            tool: tool.to_string(),
            elapsed: Duration::from_millis(timeout_ms),
        },
        ExecError::EmptyCommand => ToolError::BadArgs {
            message: err.to_string(),
        },
        other => ToolError::ExecutionFailed {
            tool: tool.to_string(),
            message: other.to_string(),
        },
    }
}

fn schema_checked(schema: &Value, input: Value) -> Result<Value, ToolError> {
    let input = require_object(input)?;
    validate_args(schema, &input)?;
    Ok(input)
}

/// Starts a command in a new exec session.
pub struct ExecCommandTool {
    sessions: Arc<ExecSessionManager>,
}

impl ExecCommandTool {
    #[must_use]
    pub fn new(sessions: Arc<ExecSessionManager>) -> Self {
        Self { sessions }
    }
}

impl Tool for ExecCommandTool {
    fn name(&self) -> &str {
        "exec_command"
    }

    fn description(&self) -> &str {
        "Run a shell command. Returns output produced within the yield window and either \
         the exit code or a session id for follow-up write_stdin calls."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "cmd": { "type": "string", "description": "Shell command to execute." },
                "workdir": { "type": "string", "description": "Working directory." },
                "shell": { "type": "string", "description": "Shell binary override." },
                "login": { "type": "boolean", "description": "Run as a login shell (default true)." },
                "yield_time_ms": { "type": "integer", "minimum": 0 },
                "max_output_tokens": { "type": "integer", "minimum": 0 },
                "execution_timeout_ms": { "type": "integer", "minimum": 1 }
            },
            "required": ["cmd"]
        })
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn validate_input(&self, input: Value) -> Result<Value, ToolError> {
        schema_checked(&self.schema(), input)
    }

    fn execute<'a>(&'a self, input: Value) -> ToolFut<'a> {
        Box::pin(async move {
            let request: ExecCommandRequest = parse_args(&input)?;
            let text = self
                .sessions
                .start(request)
                .await
                .map_err(|e| exec_error(self.name(), e))?;
            Ok(CallToolResult::text(text))
        })
    }
}

/// Feeds stdin to a running exec session and collects new output.
pub struct WriteStdinTool {
    sessions: Arc<ExecSessionManager>,
}

impl WriteStdinTool {
    #[must_use]
    pub fn new(sessions: Arc<ExecSessionManager>) -> Self {
        Self { sessions }
    }
}

impl Tool for WriteStdinTool {
    fn name(&self) -> &str {
        "write_stdin"
    }

    fn description(&self) -> &str {
        "Write characters to a running exec session's stdin and return output produced \
         since the last call. Empty chars polls."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "integer", "minimum": 1 },
                "chars": { "type": "string" },
                "yield_time_ms": { "type": "integer", "minimum": 0 },
                "max_output_tokens": { "type": "integer", "minimum": 0 }
            },
            "required": ["session_id"]
        })
    }

    fn is_mutating(&self) -> bool {
        true
    }

    /// Writes to one session must stay ordered.
    fn supports_parallel_tool_calls(&self) -> bool {
        false
    }

    fn validate_input(&self, input: Value) -> Result<Value, ToolError> {
        schema_checked(&self.schema(), input)
    }

    fn execute<'a>(&'a self, input: Value) -> ToolFut<'a> {
        Box::pin(async move {
            let request: WriteStdinRequest = parse_args(&input)?;
            let text = self
                .sessions
                .write(request)
                .await
                .map_err(|e| exec_error(self.name(), e))?;
            Ok(CallToolResult::text(text))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApplyPatchArgs {
    #[serde(alias = "patch")]
    input: String,
}

/// Applies a `*** Begin Patch` envelope under a fixed root directory.
#[derive(Debug)]
pub struct ApplyPatchTool {
    root: PathBuf,
}

impl ApplyPatchTool {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Tool for ApplyPatchTool {
    fn name(&self) -> &str {
        "apply_patch"
    }

    fn description(&self) -> &str {
        "Add, delete, move, or update files with a *** Begin Patch / *** End Patch envelope."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": { "type": "string", "description": "The full patch text." }
            },
            "required": ["input"]
        })
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn supports_parallel_tool_calls(&self) -> bool {
        false
    }

    fn validate_input(&self, input: Value) -> Result<Value, ToolError> {
        let input = require_object(input)?;
        // Accept `patch` as a synonym before the schema sees it.
        let args: ApplyPatchArgs = parse_args(&input)?;
        Ok(json!({ "input": args.input }))
    }

    fn execute<'a>(&'a self, input: Value) -> ToolFut<'a> {
        Box::pin(async move {
            let args: ApplyPatchArgs = parse_args(&input)?;
            let root = self.root.clone();
            let outcome =
                tokio::task::spawn_blocking(move || toolhost_patch::apply_patch(&args.input, &root))
                    .await
                    .map_err(|e| ToolError::ExecutionFailed {
                        tool: "apply_patch".to_string(),
                        message: format!("patch task failed: {e}"),
                    })?;
            match outcome {
                Ok(summary) => {
                    tracing::info!(files = summary.changes.len(), "Applied patch");
                    Ok(CallToolResult::text(summary.to_string()))
                }
                Err(e) => {
                    tracing::debug!("Patch rejected: {e}");
                    Ok(CallToolResult::error(format!("apply_patch: {e}")))
                }
            }
        })
    }
}

/// Register `exec_command`, `write_stdin`, and `apply_patch`.
pub fn register_builtins(
    registry: &mut ToolRegistry,
    sessions: &Arc<ExecSessionManager>,
    patch_root: impl Into<PathBuf>,
) -> Result<(), ToolError> {
    registry.register(Box::new(ExecCommandTool::new(Arc::clone(sessions))))?;
    registry.register(Box::new(WriteStdinTool::new(Arc::clone(sessions))))?;
    registry.register(Box::new(ApplyPatchTool::new(patch_root)))?;
    Ok(())
}
