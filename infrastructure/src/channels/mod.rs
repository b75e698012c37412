//! Transport channel adapters
//!
//! [`ToolChannel`](conduit_domain::ToolChannel) implementations: a spawned
//! helper process on its stdio ([`PipeChannel`]) and an outbound TCP
//! connection ([`SocketChannel`]). Both delegate the wire work to
//! [`RpcClient`] and share the capability-handshake and catalog helpers
//! below, so the registry cannot tell them apart.

pub mod pipe;
pub mod socket;

pub use pipe::PipeChannel;
pub use socket::SocketChannel;

use conduit_domain::tool::entities::{ToolCall, ToolDefinition};
use conduit_domain::tool::value_objects::ToolResult;
use conduit_domain::transport::ChannelError;

use crate::rpc::RpcClient;

/// Version tag exchanged in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Run the tool-capability handshake on a fresh connection.
pub(crate) async fn initialize(client: &RpcClient) -> Result<(), ChannelError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "client": { "name": "conduit", "version": env!("CARGO_PKG_VERSION") },
    });
    let response = client.request("initialize", Some(params)).await?;
    if let Some(error) = response.error {
        return Err(ChannelError::HandshakeFailed(format!(
            "initialize rejected (code {}): {}",
            error.code, error.message
        )));
    }
    Ok(())
}

/// Query the server's advertised catalog.
pub(crate) async fn query_tools(client: &RpcClient) -> Result<Vec<ToolDefinition>, ChannelError> {
    let response = client.request("tools/list", None).await?;
    if let Some(error) = response.error {
        return Err(ChannelError::Remote {
            code: error.code,
            message: error.message,
        });
    }
    let result = response
        .result
        .ok_or_else(|| ChannelError::Protocol("tools/list response had no result".into()))?;
    let tools = result
        .get("tools")
        .cloned()
        .ok_or_else(|| ChannelError::Protocol("tools/list result had no tools field".into()))?;
    serde_json::from_value(tools)
        .map_err(|e| ChannelError::Protocol(format!("malformed tool catalog: {}", e)))
}

/// Invoke one tool and map the response back into a [`ToolResult`].
pub(crate) async fn invoke_tool(
    client: &RpcClient,
    call: &ToolCall,
) -> Result<ToolResult, ChannelError> {
    let params = serde_json::json!({
        "name": call.tool_name,
        "arguments": call.arguments_value(),
    });
    let response = client.request("tools/call", Some(params)).await?;
    if let Some(error) = response.error {
        return Err(ChannelError::Remote {
            code: error.code,
            message: error.message,
        });
    }
    let result = response
        .result
        .ok_or_else(|| ChannelError::Protocol("tools/call response had no result".into()))?;

    // Conduit servers answer with a serialized ToolResult; foreign servers
    // may answer with any JSON, which is wrapped as raw output.
    match serde_json::from_value::<ToolResult>(result.clone()) {
        Ok(tool_result) => Ok(tool_result),
        Err(_) => Ok(ToolResult::success(&call.tool_name, result.to_string())),
    }
}
