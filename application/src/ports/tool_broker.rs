//! Tool broker port
//!
//! Defines the agent loop's view of the orchestration layer: call a tool by
//! name, enumerate what exists, probe membership. Implementations (the
//! connection registry) live in the infrastructure layer.

use async_trait::async_trait;
use conduit_domain::tool::entities::{ToolCall, ToolDefinition};
use conduit_domain::tool::value_objects::ToolResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A tool tagged with the server that advertises it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTool {
    /// Name of the owning server
    pub server: String,
    /// The advertised definition
    pub tool: ToolDefinition,
}

/// Error type for broker operations
#[derive(Debug, Error)]
pub enum BrokerError {
    /// No live server advertises the tool, even after a full catalog scan
    #[error("Tool not found: {0}")]
    ToolNotFound(String),
}

/// Port for uniform tool invocation
///
/// # Contract
///
/// - `call_tool` resolves the owning server via the routing table, falling
///   back to a full catalog scan across live handles on a miss. It returns
///   [`BrokerError::ToolNotFound`] only after the scan exhausts every
///   handle. Transport-level failures surface as failed [`ToolResult`]s,
///   not errors — callers must be able to tell "tool missing" apart from
///   "channel down".
/// - `has_tool` is the optimistic fast path: a pure membership check with
///   no fallback scan. Callers needing certainty use `call_tool` and handle
///   the not-found error.
#[async_trait]
pub trait ToolBrokerPort: Send + Sync {
    /// Invoke a tool by name, wherever it lives.
    async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, BrokerError>;

    /// Every advertised tool across all live servers, each tagged with its
    /// owner. A single server's catalog failure is excluded, not propagated.
    async fn list_tools(&self) -> Vec<ServerTool>;

    /// Routing-table membership check; no fallback scan.
    fn has_tool(&self, name: &str) -> bool;
}
