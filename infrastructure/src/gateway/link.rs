//! The gateway's socket link to its remote peer
//!
//! One independently-failing connection that may be connected, connecting,
//! or dead. The pending-call correlation machinery lives in [`RpcClient`];
//! the link adds the bounded reconnect burst around it and the observable
//! state the `browser_status` tool reports.
//!
//! The burst bound governs one connect attempt sequence, not the lifetime
//! of the process: a new tool call after exhaustion starts a fresh burst.

use conduit_domain::transport::ChannelError;
use conduit_domain::transport::reconnect::ReconnectState;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::GatewayConfig;
use crate::channels::socket::host_port;
use crate::rpc::RpcClient;

/// Snapshot of the link for the status tool.
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    pub connected: bool,
    pub addr: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub retry_interval_ms: u64,
}

/// The gateway's single socket handle. Reconnecting replaces it.
pub struct RemoteLink {
    addr: String,
    config: GatewayConfig,
    client: std::sync::Mutex<Option<Arc<RpcClient>>>,
    state: std::sync::Mutex<ReconnectState>,
}

impl RemoteLink {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            addr: host_port(&config.url).to_string(),
            state: std::sync::Mutex::new(ReconnectState::new(
                config.max_attempts,
                config.retry_interval,
            )),
            client: std::sync::Mutex::new(None),
            config,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Answered locally, never requiring the remote side.
    pub fn status(&self) -> LinkStatus {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        LinkStatus {
            connected: self.live_client().is_some(),
            addr: self.addr.clone(),
            attempts: state.attempts(),
            max_attempts: state.max_attempts(),
            retry_interval_ms: state.interval().as_millis() as u64,
        }
    }

    /// The current client, dropping it if its reader loop has ended.
    fn live_client(&self) -> Option<Arc<RpcClient>> {
        let mut slot = self.client.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(client) if !client.is_closed() => Some(Arc::clone(client)),
            Some(_) => {
                debug!(addr = %self.addr, "gateway link reader ended, dropping client");
                *slot = None;
                None
            }
            None => None,
        }
    }

    /// Forget the current client so the next call reconnects.
    pub fn drop_client(&self) {
        let mut slot = self.client.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = slot.take() {
            client.shutdown();
        }
    }

    /// Return the live client, making a bounded connect burst first if the
    /// link is down.
    ///
    /// Attempts within the burst are separated by the fixed retry interval
    /// and logged rate-limited (the first, every fifth, and the final one).
    /// The counter resets on success; a caller arriving after a previous
    /// burst was exhausted starts the count from zero again.
    pub async fn ensure_connected(&self) -> Result<Arc<RpcClient>, ChannelError> {
        if let Some(client) = self.live_client() {
            return Ok(client);
        }

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.reset();
        }

        loop {
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    let (read_half, write_half) = stream.into_split();
                    let client = Arc::new(
                        RpcClient::new(read_half, write_half)
                            .with_request_timeout(self.config.call_timeout),
                    );
                    {
                        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                        state.record_success();
                    }
                    {
                        let mut slot = self.client.lock().unwrap_or_else(|e| e.into_inner());
                        *slot = Some(Arc::clone(&client));
                    }
                    info!(addr = %self.addr, "gateway link connected");
                    return Ok(client);
                }
                Err(e) => {
                    let (attempt, report, exhausted) = {
                        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                        let attempt = state.record_failure();
                        (attempt, state.should_report(), state.exhausted())
                    };
                    if report {
                        warn!(
                            addr = %self.addr,
                            attempt,
                            max = self.config.max_attempts,
                            error = %e,
                            "gateway link connect failed"
                        );
                    }
                    if exhausted {
                        return Err(ChannelError::ConnectFailed(format!(
                            "{} unreachable after {} attempts: {}",
                            self.addr, attempt, e
                        )));
                    }
                }
            }
            tokio::time::sleep(self.config.retry_interval).await;
        }
    }
}
