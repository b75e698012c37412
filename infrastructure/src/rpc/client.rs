//! Awaitable JSON-RPC calls over an event-style byte stream.
//!
//! [`RpcClient`] owns one connection's read half in a background reader
//! task and correlates each response line with the pending request that
//! carries the same id. This turns callback-style socket messaging into
//! ordinary `await`able calls:
//!
//! 1. `request()` registers a oneshot sender under a fresh id,
//! 2. writes the request as one line,
//! 3. suspends on the oneshot with a timeout,
//! 4. the reader task fulfils it when the matching response arrives.
//!
//! When the reader loop ends — peer closed, I/O error — every pending
//! entry is dropped so suspended callers observe [`ChannelError::Closed`]
//! instead of hanging. Timed-out entries are removed eagerly; a late
//! response with a cleared id is logged and ignored.

use conduit_domain::transport::ChannelError;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::protocol::{JsonRpcRequest, JsonRpcResponse, MessageKind, classify_message};

/// Default window a single request may stay in flight.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type PendingMap = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// One connection's client half: a writer, a background reader, and the
/// pending-call table joining them.
pub struct RpcClient {
    next_id: AtomicU64,
    pending: PendingMap,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    reader_handle: JoinHandle<()>,
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl RpcClient {
    /// Build a client over any pair of stream halves.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let pending_bg = Arc::clone(&pending);
        let closed_bg = Arc::clone(&closed);
        let reader_handle = tokio::spawn(async move {
            Self::reader_loop(reader, pending_bg, closed_bg).await;
        });

        Self {
            next_id: AtomicU64::new(1),
            pending,
            writer: Mutex::new(Box::new(writer)),
            reader_handle,
            closed,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.set_request_timeout(timeout);
        self
    }

    /// Set the request timeout in place. Mirrors [`with_request_timeout`]
    /// for callers that cannot move `self` out — e.g. a field of a type
    /// that implements `Drop`.
    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = timeout;
    }

    /// Whether the reader loop has ended. A closed client fails every
    /// subsequent request with [`ChannelError::Closed`].
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Background reader loop — single owner of the read half.
    ///
    /// Each line is parsed and classified; responses resolve their pending
    /// entry, anything else is logged and dropped (conduit clients do not
    /// serve requests). On exit the pending table is drained so receivers
    /// observe a closed channel.
    async fn reader_loop<R>(reader: R, pending: PendingMap, closed: Arc<AtomicBool>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut lines = BufReader::new(reader).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("rpc reader: peer closed the stream");
                    break;
                }
                Err(e) => {
                    warn!("rpc reader: read error: {}", e);
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }
            trace!("rpc received: {}", line);

            let json: serde_json::Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(e) => {
                    warn!("rpc reader: unparsable line ({} bytes): {}", line.len(), e);
                    continue;
                }
            };

            match classify_message(&json) {
                MessageKind::Response => {
                    let Some(id) = json.get("id").and_then(|v| v.as_u64()) else {
                        continue;
                    };
                    let response: JsonRpcResponse = match serde_json::from_value(json) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("rpc reader: malformed response for id={}: {}", id, e);
                            continue;
                        }
                    };
                    let sender = {
                        let mut map = pending.lock().unwrap_or_else(|e| e.into_inner());
                        map.remove(&id)
                    };
                    match sender {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => {
                            // Timed out or never ours; ignored by design.
                            debug!("rpc reader: no pending receiver for id={}", id);
                        }
                    }
                }
                MessageKind::IncomingRequest { id } => {
                    warn!("rpc reader: peer sent a request (id={}), ignoring", id);
                }
                MessageKind::Notification => {
                    trace!(
                        "rpc reader: notification {}",
                        json.get("method").and_then(|m| m.as_str()).unwrap_or("?")
                    );
                }
            }
        }

        // Reader ended — mark closed, then drain pending so suspended
        // callers unblock and later requests fail fast.
        closed.store(true, Ordering::SeqCst);
        let drained = {
            let mut map = pending.lock().unwrap_or_else(|e| e.into_inner());
            let n = map.len();
            map.clear();
            n
        };
        if drained > 0 {
            debug!("rpc reader: rejected {} pending call(s) on close", drained);
        }
    }

    /// Send a request and wait for the correlated response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let (tx, rx) = oneshot::channel();

        {
            let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            map.insert(id, tx);
        }

        if let Err(e) = self.send_line(&request).await {
            let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            map.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                // Clear the entry so a late response is ignored, not leaked.
                let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                map.remove(&id);
                Err(ChannelError::Timeout(method.to_string()))
            }
        }
    }

    async fn send_line(&self, request: &JsonRpcRequest) -> Result<(), ChannelError> {
        let mut json = serde_json::to_string(request)
            .map_err(|e| ChannelError::Protocol(format!("serialize request: {}", e)))?;
        trace!("rpc sending: {}", json);
        json.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Stop the reader task. Pending calls are drained; later requests fail
    /// with [`ChannelError::Closed`].
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader_handle.abort();
        let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        map.clear();
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The writer is a boxed trait object that is not `Debug`; report the
        // observable state instead.
        f.debug_struct("RpcClient")
            .field("next_id", &self.next_id)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}
