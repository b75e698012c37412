//! Gateway server — the browser bridge
//!
//! Presents a fixed, statically declared browser toolset to the connection
//! registry while actually executing every call on a remote peer reachable
//! only over an independent socket link. To the registry this is an
//! ordinary pipe tool server (`conduit gateway` behind the stdio serve
//! loop); internally each inbound call becomes a correlated
//! `{jsonrpc, id, method, params}` request over the socket.
//!
//! Degradation contract: when the link is down and a bounded connect burst
//! cannot raise it, remote tools answer with a structured
//! `SERVICE_UNAVAILABLE` result naming every affected tool — never a
//! protocol-level error, so the agent session degrades instead of
//! crashing. `browser_status` is the exception that always answers
//! locally, even fully disconnected, so operators can diagnose the link.

pub mod link;

use async_trait::async_trait;
use conduit_domain::tool::entities::{ToolCall, ToolDefinition};
use conduit_domain::tool::value_objects::{ToolError, ToolResult};
use conduit_domain::transport::ChannelError;
use std::time::Duration;
use tracing::{debug, warn};

use crate::host::StdioToolServer;

pub use link::{LinkStatus, RemoteLink};

/// Default target address of the browser extension host.
pub const DEFAULT_ADDR: &str = "127.0.0.1:9224";

/// Default bound on one connect burst.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default fixed delay between attempts within a burst.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Default window a forwarded call may stay pending.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// The one tool answered locally, whatever the link state.
pub const STATUS_TOOL: &str = "browser_status";

/// Tools executed on the remote peer; also the affected-tool list reported
/// when the link is down.
pub const REMOTE_TOOLS: [&str; 6] = [
    "browser_navigate",
    "browser_read_page",
    "browser_find",
    "browser_click",
    "browser_type",
    "browser_screenshot",
];

/// Gateway configuration, environment-overridable per deployment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket target, `host:port` or `tcp://host:port`
    pub url: String,
    pub max_attempts: u32,
    pub retry_interval: Duration,
    pub call_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Read `CONDUIT_BROWSER_ADDR`, `CONDUIT_BROWSER_MAX_ATTEMPTS`,
    /// `CONDUIT_BROWSER_RETRY_MS`, and `CONDUIT_BROWSER_CALL_TIMEOUT_MS`,
    /// falling back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("CONDUIT_BROWSER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.into()),
            max_attempts: env_parse("CONDUIT_BROWSER_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            retry_interval: Duration::from_millis(env_parse(
                "CONDUIT_BROWSER_RETRY_MS",
                DEFAULT_RETRY_INTERVAL.as_millis() as u64,
            )),
            call_timeout: Duration::from_millis(env_parse(
                "CONDUIT_BROWSER_CALL_TIMEOUT_MS",
                DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            )),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADDR)
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "unparsable environment value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// The gateway server: a static catalog in front of one [`RemoteLink`].
pub struct GatewayServer {
    link: RemoteLink,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            link: RemoteLink::new(config),
        }
    }

    pub fn from_env() -> Self {
        Self::new(GatewayConfig::from_env())
    }

    pub fn link(&self) -> &RemoteLink {
        &self.link
    }

    fn status_result(&self) -> ToolResult {
        let status = self.link.status();
        match serde_json::to_string_pretty(&status) {
            Ok(json) => ToolResult::success(STATUS_TOOL, json),
            Err(e) => ToolResult::failure(STATUS_TOOL, ToolError::execution_failed(e.to_string())),
        }
    }

    fn unavailable_result(&self, tool: &str) -> ToolResult {
        let affected: Vec<String> = REMOTE_TOOLS.iter().map(|t| t.to_string()).collect();
        ToolResult::failure(
            tool,
            ToolError::unavailable(
                format!("browser extension not reachable at {}", self.link.addr()),
                &affected,
                "Start the browser extension host, or point CONDUIT_BROWSER_ADDR at it, and retry.",
            ),
        )
    }

    /// Forward one call over the link as a correlated envelope.
    async fn forward(&self, call: &ToolCall) -> ToolResult {
        let client = match self.link.ensure_connected().await {
            Ok(client) => client,
            Err(e) => {
                debug!(tool = %call.tool_name, error = %e, "gateway link down");
                return self.unavailable_result(&call.tool_name);
            }
        };

        match client
            .request(&call.tool_name, Some(call.arguments_value()))
            .await
        {
            Ok(response) => {
                if let Some(error) = response.error {
                    return ToolResult::failure(
                        &call.tool_name,
                        ToolError::execution_failed(error.message)
                            .with_details(format!("remote code {}", error.code)),
                    );
                }
                let output = match response.result {
                    Some(serde_json::Value::String(text)) => text,
                    Some(value) => value.to_string(),
                    None => String::new(),
                };
                ToolResult::success(&call.tool_name, output)
            }
            Err(ChannelError::Timeout(_)) => {
                ToolResult::failure(&call.tool_name, ToolError::timeout(&call.tool_name))
            }
            Err(e) => {
                // The link died mid-call; forget the client so the next
                // call starts a reconnect burst.
                warn!(tool = %call.tool_name, error = %e, "gateway call failed at transport level");
                self.link.drop_client();
                self.unavailable_result(&call.tool_name)
            }
        }
    }
}

/// The statically declared browser toolset.
pub fn browser_toolset() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            STATUS_TOOL,
            "Report the browser link state: connection, target address, retry counters",
        ),
        ToolDefinition::new("browser_navigate", "Navigate the active tab to a URL").with_schema(
            serde_json::json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "Destination URL" },
                },
                "required": ["url"],
            }),
        ),
        ToolDefinition::new(
            "browser_read_page",
            "Read the visible text content of the active tab",
        )
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "selector": {
                    "type": "string",
                    "description": "CSS selector to scope the read (default: whole page)",
                },
            },
        })),
        ToolDefinition::new("browser_find", "Find elements matching a CSS selector or text")
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "CSS selector or text to find" },
                },
                "required": ["query"],
            })),
        ToolDefinition::new("browser_click", "Click the element matching a selector").with_schema(
            serde_json::json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector of the element" },
                },
                "required": ["selector"],
            }),
        ),
        ToolDefinition::new("browser_type", "Type text into the focused or selected element")
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to type" },
                    "selector": {
                        "type": "string",
                        "description": "CSS selector to focus first (optional)",
                    },
                },
                "required": ["text"],
            })),
        ToolDefinition::new("browser_screenshot", "Capture a screenshot of the active tab")
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "full_page": {
                        "type": "boolean",
                        "description": "Capture the full page instead of the viewport",
                    },
                },
            })),
    ]
}

#[async_trait]
impl StdioToolServer for GatewayServer {
    fn name(&self) -> &str {
        "browser"
    }

    async fn tools(&self) -> Vec<ToolDefinition> {
        browser_toolset()
    }

    async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        if call.tool_name == STATUS_TOOL {
            return self.status_result();
        }
        if !REMOTE_TOOLS.contains(&call.tool_name.as_str()) {
            return ToolResult::failure(
                &call.tool_name,
                ToolError::not_found(format!("tool not found: {}", call.tool_name)),
            );
        }
        self.forward(call).await
    }
}
