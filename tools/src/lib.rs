//! Tool framework: the `Tool` trait, the name-keyed registry, and the built-in tools.

pub mod builtins;
pub mod mcp;

pub use builtins::{ApplyPatchTool, ExecCommandTool, WriteStdinTool, register_builtins};
pub use mcp::{McpClient, McpTool, is_mcp_tool, parse_qualified_tool_name, qualified_tool_name};

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use toolhost_types::CallToolResult;

/// Tool execution future type alias.
pub type ToolFut<'a> =
    Pin<Box<dyn Future<Output = Result<CallToolResult, ToolError>> + Send + 'a>>;

/// Where a tool's implementation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Builtin,
    Mcp,
    /// Delegates to another agent. Never gated by approval.
    SubAgent,
}

/// Error types for tool execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Bad tool args: {message}")]
    BadArgs { message: String },
    #[error("Command timed out after {} ms", .elapsed.as_millis())]
    Timeout { tool: String, elapsed: Duration },
    #[error("Sandbox violation: {0}")]
    SandboxViolation(String),
    #[error("{tool}: {message}")]
    ExecutionFailed { tool: String, message: String },
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("Duplicate tool registered: {name}")]
    DuplicateTool { name: String },
}

/// A named operation the orchestrator can dispatch.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the input object.
    fn schema(&self) -> Value;
    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }
    /// Whether the tool changes state outside the process (files, processes, remote).
    fn is_mutating(&self) -> bool;
    fn supports_parallel_tool_calls(&self) -> bool {
        true
    }
    /// Final say on the input before `execute`. The result must be a JSON object.
    fn validate_input(&self, input: Value) -> Result<Value, ToolError> {
        require_object(input)
    }
    fn execute<'a>(&'a self, input: Value) -> ToolFut<'a>;
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::BadArgs {
        message: e.to_string(),
    })
}

pub(crate) fn require_object(input: Value) -> Result<Value, ToolError> {
    if input.is_object() {
        Ok(input)
    } else {
        Err(ToolError::BadArgs {
            message: "tool input must be a JSON object".to_string(),
        })
    }
}

/// Validate arguments against a JSON schema.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ToolError::BadArgs {
        message: format!("Invalid tool schema: {e}"),
    })?;
    if let Err(err) = validator.validate(args) {
        return Err(ToolError::BadArgs {
            message: err.to_string(),
        });
    }
    Ok(())
}

/// Tool metadata as advertised to a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub kind: ToolKind,
    pub mutating: bool,
}

/// Name-keyed tool table.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }
        tracing::debug!(tool = %name, kind = ?tool.kind(), "Registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn Tool, ToolError> {
        self.tools
            .get(name)
            .map(std::convert::AsRef::as_ref)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.schema(),
                kind: tool.kind(),
                mutating: tool.is_mutating(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}
