//! Stdio serving loop for tool servers
//!
//! Reads one JSON-RPC request per line, dispatches it, and writes one
//! response per line. Both the built-in hosts and the gateway server run
//! behind this loop, which is what makes them indistinguishable to the
//! registry's pipe channel.
//!
//! Protocol surface: `initialize`, `ping`, `tools/list`, `tools/call`.
//! Notifications get no reply; malformed lines get a PARSE_ERROR with a
//! null id; unknown methods get METHOD_NOT_FOUND.

use async_trait::async_trait;
use conduit_domain::tool::entities::{ToolCall, ToolDefinition};
use conduit_domain::tool::value_objects::ToolResult;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::channels::PROTOCOL_VERSION;
use crate::rpc::{IncomingRequest, JsonRpcResponseOut, RpcError};

/// Anything that can sit behind the stdio serving loop.
#[async_trait]
pub trait StdioToolServer: Send + Sync {
    /// Server name reported in the `initialize` result.
    fn name(&self) -> &str;

    /// The advertised tool catalog.
    async fn tools(&self) -> Vec<ToolDefinition>;

    /// Execute one tool call.
    async fn dispatch(&self, call: &ToolCall) -> ToolResult;
}

/// Serve over this process's stdin/stdout.
pub async fn serve_stdio<S>(server: &S) -> std::io::Result<()>
where
    S: StdioToolServer + ?Sized,
{
    serve_loop(server, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve over arbitrary stream halves (tests drive this with duplex pipes,
/// the socket-facing hosts with TCP halves).
pub async fn serve_loop<S, R, W>(server: &S, reader: R, mut writer: W) -> std::io::Result<()>
where
    S: StdioToolServer + ?Sized,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    info!(server = server.name(), "tool server serving");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: IncomingRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("unparsable request line: {}", e);
                let response = JsonRpcResponseOut::error(
                    serde_json::Value::Null,
                    RpcError::new(RpcError::PARSE_ERROR, e.to_string()),
                );
                write_response(&mut writer, &response).await?;
                continue;
            }
        };

        if let Some(response) = handle_request(server, request).await {
            write_response(&mut writer, &response).await?;
        }
    }

    info!(server = server.name(), "tool server shutting down");
    Ok(())
}

async fn handle_request<S>(server: &S, request: IncomingRequest) -> Option<JsonRpcResponseOut>
where
    S: StdioToolServer + ?Sized,
{
    let result = match request.method.as_str() {
        "initialize" => {
            debug!(server = server.name(), "initialize");
            Ok(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": server.name(),
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": { "tools": {} },
            }))
        }
        "initialized" | "notifications/initialized" | "ping" => Ok(serde_json::json!({})),
        "tools/list" => {
            let tools = server.tools().await;
            serde_json::to_value(serde_json::json!({ "tools": tools }))
                .map_err(|e| RpcError::new(RpcError::INTERNAL_ERROR, e.to_string()))
        }
        "tools/call" => handle_tools_call(server, &request.params).await,
        other => Err(RpcError::new(
            RpcError::METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        )),
    };

    if request.is_notification() {
        if let Err(e) = result {
            warn!(method = %request.method, error = %e.message, "notification handling failed");
        }
        return None;
    }

    Some(match result {
        Ok(value) => JsonRpcResponseOut::success(request.id, value),
        Err(error) => JsonRpcResponseOut::error(request.id, error),
    })
}

async fn handle_tools_call<S>(
    server: &S,
    params: &serde_json::Value,
) -> Result<serde_json::Value, RpcError>
where
    S: StdioToolServer + ?Sized,
{
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::new(RpcError::INVALID_PARAMS, "Missing 'name' parameter"))?;
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    let call = ToolCall::from_value(name, &arguments);
    let result = server.dispatch(&call).await;
    if result.is_success() {
        info!(tool = %name, "tool call completed");
    } else {
        warn!(tool = %name, error = ?result.error(), "tool call failed");
    }

    serde_json::to_value(result).map_err(|e| RpcError::new(RpcError::INTERNAL_ERROR, e.to_string()))
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponseOut,
) -> std::io::Result<()> {
    let mut json = serde_json::to_string(response).map_err(std::io::Error::other)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await
}
