//! Built-in tool host
//!
//! The in-process side of the built-in servers: a name→handler map exposed
//! through the same `tools/list` / `tools/call` surface as any remote
//! server, plus the stdio serve loop that turns a host into the helper
//! process the lifecycle manager spawns (`conduit serve <name>`).
//!
//! Unknown tools and handler failures are *results*, not transport errors:
//! the host always answers, and the caller decides what a failed tool call
//! means.

pub mod serve;
pub mod shell;
pub mod workspace;

use async_trait::async_trait;
use conduit_domain::tool::entities::{ToolCall, ToolDefinition};
use conduit_domain::tool::value_objects::{ToolError, ToolResult};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub use serve::{StdioToolServer, serve_loop, serve_stdio};

/// Ceiling for a single tool execution.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Executable side of one tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The advertised definition.
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with the given call's arguments.
    async fn execute(&self, call: &ToolCall) -> ToolResult;
}

/// A fixed set of locally implemented tools behind one server name.
pub struct ToolHost {
    name: String,
    tools: HashMap<String, Box<dyn ToolHandler>>,
    call_timeout: Duration,
}

impl ToolHost {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: HashMap::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Register a tool handler (builder pattern).
    pub fn register<H: ToolHandler + 'static>(mut self, handler: H) -> Self {
        let name = handler.definition().name;
        self.tools.insert(name, Box::new(handler));
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All registered tool definitions, sorted by name for stable output.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> =
            self.tools.values().map(|h| h.definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Execute a tool by name with a per-call timeout.
    pub async fn call(&self, call: &ToolCall) -> ToolResult {
        let Some(handler) = self.tools.get(&call.tool_name) else {
            return ToolResult::failure(
                &call.tool_name,
                ToolError::not_found(format!("tool not found: {}", call.tool_name)),
            );
        };

        debug!(tool = %call.tool_name, host = %self.name, "executing tool");
        match tokio::time::timeout(self.call_timeout, handler.execute(call)).await {
            Ok(result) => result,
            Err(_) => ToolResult::failure(&call.tool_name, ToolError::timeout(&call.tool_name)),
        }
    }
}

#[async_trait]
impl StdioToolServer for ToolHost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tools(&self) -> Vec<ToolDefinition> {
        self.list_tools()
    }

    async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        self.call(call).await
    }
}

/// The `workspace` built-in server: file tools.
pub fn workspace_host() -> ToolHost {
    ToolHost::new("workspace")
        .register(workspace::ReadFileTool)
        .register(workspace::WriteFileTool)
        .register(workspace::ListDirTool)
}

/// The `shell` built-in server: command execution.
pub fn shell_host() -> ToolHost {
    ToolHost::new("shell").register(shell::RunCommandTool)
}

/// Look up a built-in host by server name.
pub fn builtin_host(name: &str) -> Option<ToolHost> {
    match name {
        "workspace" => Some(workspace_host()),
        "shell" => Some(shell_host()),
        _ => None,
    }
}
