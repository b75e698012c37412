//! Socket channel — an outbound TCP connection to a running server.

use async_trait::async_trait;
use conduit_domain::server::TransportKind;
use conduit_domain::tool::entities::{ToolCall, ToolDefinition};
use conduit_domain::tool::value_objects::ToolResult;
use conduit_domain::transport::{ChannelError, ToolChannel};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::rpc::RpcClient;

/// Strip an optional scheme prefix so descriptors may carry either a bare
/// `host:port` or a `tcp://host:port` URL.
pub fn host_port(url: &str) -> &str {
    url.strip_prefix("tcp://").unwrap_or(url)
}

/// One live outbound socket connection.
#[derive(Debug)]
pub struct SocketChannel {
    client: RpcClient,
}

impl SocketChannel {
    /// Connect and complete the handshake.
    pub async fn connect(url: &str) -> Result<Self, ChannelError> {
        let addr = host_port(url);
        debug!("connecting socket channel to {}", addr);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ChannelError::ConnectFailed(format!("connect {}: {}", addr, e)))?;
        let (read_half, write_half) = stream.into_split();

        let channel = Self {
            client: RpcClient::new(read_half, write_half),
        };
        super::initialize(&channel.client).await?;
        Ok(channel)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_request_timeout(timeout);
        self
    }
}

#[async_trait]
impl ToolChannel for SocketChannel {
    fn transport(&self) -> TransportKind {
        TransportKind::SocketOutbound
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ChannelError> {
        super::query_tools(&self.client).await
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ChannelError> {
        super::invoke_tool(&self.client, call).await
    }

    async fn close(&self) {
        self.client.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host;
    use tokio::net::TcpListener;

    #[test]
    fn test_host_port_strips_scheme() {
        assert_eq!(host_port("tcp://127.0.0.1:9224"), "127.0.0.1:9224");
        assert_eq!(host_port("127.0.0.1:9224"), "127.0.0.1:9224");
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_failed() {
        // Bind then drop to obtain a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = SocketChannel::connect(&addr.to_string()).await.unwrap_err();
        assert!(matches!(err, ChannelError::ConnectFailed(_)));
    }

    #[tokio::test]
    async fn test_connect_and_list_against_hosted_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, write_half) = stream.into_split();
            let server = host::shell_host();
            let _ = host::serve::serve_loop(&server, read_half, write_half).await;
        });

        let channel = SocketChannel::connect(&format!("tcp://{}", addr))
            .await
            .unwrap();
        let tools = channel.list_tools().await.unwrap();
        assert!(tools.iter().any(|t| t.name == "run_command"));
    }
}
