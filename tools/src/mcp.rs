//! Adapter exposing tools of remote MCP servers through the registry.
//!
//! Transport and auth live behind [`McpClient`]; this module only handles naming and
//! forwarding. Registered names are `mcp__<server>__<tool>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use toolhost_types::CallToolResult;

use super::{Tool, ToolError, ToolFut, ToolKind};

const MCP_PREFIX: &str = "mcp__";
const MCP_SEPARATOR: &str = "__";

pub type McpCallFut<'a> =
    Pin<Box<dyn Future<Output = Result<CallToolResult, ToolError>> + Send + 'a>>;

/// Connection to one or more MCP servers.
pub trait McpClient: Send + Sync {
    fn call_tool<'a>(&'a self, server: &'a str, tool: &'a str, arguments: Value)
    -> McpCallFut<'a>;
}

#[must_use]
pub fn qualified_tool_name(server: &str, tool: &str) -> String {
    format!("{MCP_PREFIX}{server}{MCP_SEPARATOR}{tool}")
}

#[must_use]
pub fn is_mcp_tool(name: &str) -> bool {
    parse_qualified_tool_name(name).is_some()
}

/// Split `mcp__server__tool` into `(server, tool)`. The tool part may itself contain
/// `__`; the server part may not.
#[must_use]
pub fn parse_qualified_tool_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix(MCP_PREFIX)?;
    let (server, tool) = rest.split_once(MCP_SEPARATOR)?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

/// One remote tool, forwarded verbatim to its server.
pub struct McpTool {
    name: String,
    server: String,
    tool: String,
    description: String,
    input_schema: Value,
    mutating: bool,
    client: Arc<dyn McpClient>,
}

impl McpTool {
    pub fn new(
        client: Arc<dyn McpClient>,
        server: impl Into<String>,
        tool: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        let server = server.into();
        let tool = tool.into();
        Self {
            name: qualified_tool_name(&server, &tool),
            server,
            tool,
            description: description.into(),
            input_schema,
            mutating: true,
            client,
        }
    }

    /// Servers that advertise a read-only hint can skip approval in default mode.
    pub fn read_only(mut self) -> Self {
        self.mutating = false;
        self
    }
}

impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Value {
        self.input_schema.clone()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Mcp
    }

    fn is_mutating(&self) -> bool {
        self.mutating
    }

    fn execute<'a>(&'a self, input: Value) -> ToolFut<'a> {
        Box::pin(async move {
            tracing::debug!(server = %self.server, tool = %self.tool, "Executing MCP tool");
            self.client.call_tool(&self.server, &self.tool, input).await
        })
    }
}
