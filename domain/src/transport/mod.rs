//! Transport channel abstraction
//!
//! This module defines the [`ToolChannel`] trait, the seam the connection
//! registry routes every tool call through. A channel is one live, logical
//! connection to one tool-providing server — a spawned helper process on a
//! pipe, an outbound socket, or anything else that can answer a catalog
//! query and an invocation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ConnectionRegistry                         │
//! │  (owns handles, routes by tool name, falls back to scan)    │
//! └─────────────────────────────────────────────────────────────┘
//!           │                  │                  │
//!           ▼                  ▼                  ▼
//!    ┌────────────┐     ┌────────────┐     ┌────────────┐
//!    │ PipeChannel│     │ PipeChannel│     │SocketChannel│
//!    │ (built-in) │     │ (external) │     │ (outbound) │
//!    └────────────┘     └────────────┘     └────────────┘
//! ```
//!
//! Exactly one channel exists per server name at a time; reconnecting
//! replaces the channel, it does not stack. Calls on one channel may
//! complete out of submission order — the channel gives no ordering
//! guarantee beyond per-message integrity.

pub mod reconnect;

use async_trait::async_trait;
use thiserror::Error;

use crate::server::TransportKind;
use crate::tool::entities::{ToolCall, ToolDefinition};
use crate::tool::value_objects::ToolResult;

/// Error type for channel operations
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel could not be established
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// The capability handshake after connect did not complete
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// The channel was open once and is now gone
    #[error("Channel closed")]
    Closed,

    /// No response within the call window
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The peer sent something the protocol does not allow
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer answered with a protocol-level error
    #[error("Remote error (code {code}): {message}")]
    Remote { code: i64, message: String },

    /// A reserved transport kind with no implementation
    #[error("Transport not implemented: {0}")]
    NotImplemented(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One live, logical connection to one tool-providing server.
#[async_trait]
pub trait ToolChannel: Send + Sync {
    /// The transport this channel was established over (observability only).
    fn transport(&self) -> TransportKind;

    /// Query the server's advertised tool catalog.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ChannelError>;

    /// Invoke a tool on the server.
    ///
    /// A `ToolResult` carrying an error means the server executed (or
    /// refused) the call; a `ChannelError` means the call never completed
    /// at the transport level.
    async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ChannelError>;

    /// Close the channel, releasing any owned process or socket.
    /// Further calls return [`ChannelError::Closed`].
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::value_objects::ToolError;

    /// A scripted channel for exercising the trait surface.
    struct StaticChannel {
        tools: Vec<ToolDefinition>,
    }

    #[async_trait]
    impl ToolChannel for StaticChannel {
        fn transport(&self) -> TransportKind {
            TransportKind::PipeLocal
        }

        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ChannelError> {
            Ok(self.tools.clone())
        }

        async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ChannelError> {
            if self.tools.iter().any(|t| t.name == call.tool_name) {
                Ok(ToolResult::success(&call.tool_name, "ok"))
            } else {
                Ok(ToolResult::failure(
                    &call.tool_name,
                    ToolError::not_found(&call.tool_name),
                ))
            }
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_channel_catalog_and_call() {
        let channel = StaticChannel {
            tools: vec![ToolDefinition::new("read_file", "Read a file")],
        };

        let tools = channel.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);

        let ok = channel
            .call_tool(&ToolCall::new("read_file"))
            .await
            .unwrap();
        assert!(ok.is_success());

        let missing = channel.call_tool(&ToolCall::new("nope")).await.unwrap();
        assert_eq!(missing.error().unwrap().code, "NOT_FOUND");
    }
}
