//! Pipe channel — a helper process reached over its stdio.
//!
//! The helper is spawned with piped stdin/stdout (the protocol) and
//! inherited stderr (its logs). On Linux the kernel delivers SIGTERM to the
//! helper if this process dies without running Drop, so a crashed registry
//! does not leave orphan servers behind.

use async_trait::async_trait;
use conduit_domain::server::TransportKind;
use conduit_domain::tool::entities::{ToolCall, ToolDefinition};
use conduit_domain::tool::value_objects::ToolResult;
use conduit_domain::transport::{ChannelError, ToolChannel};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::rpc::RpcClient;

/// Spawn a helper process with its stdio wired for the pipe protocol.
///
/// The command is resolved up front so a missing executable fails with a
/// readable error instead of a raw ENOENT from `spawn`.
pub async fn spawn_helper(
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
    working_dir: Option<&str>,
) -> Result<Child, ChannelError> {
    let resolved = which::which(command).map_err(|e| {
        ChannelError::ConnectFailed(format!("command '{}' not found: {}", command, e))
    })?;
    debug!("spawning helper: {} {:?}", resolved.display(), args);

    let mut cmd = Command::new(resolved);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    for (key, value) in env {
        cmd.env(key, value);
    }

    // Linux: request kernel to send SIGTERM to the helper when this process
    // dies. Catches cases where Drop doesn't run (SIGKILL, OOM kill).
    #[cfg(target_os = "linux")]
    unsafe {
        cmd.pre_exec(|| {
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
            Ok(())
        });
    }

    cmd.spawn()
        .map_err(|e| ChannelError::ConnectFailed(format!("spawn '{}': {}", command, e)))
}

/// One live pipe connection, optionally owning the helper process behind it.
///
/// Built-in servers are owned by the lifecycle manager's subprocess table,
/// so their channels are built with [`PipeChannel::from_io`] and carry no
/// child; externally configured servers attach theirs via
/// [`PipeChannel::connect`] and the channel kills it on close or Drop.
pub struct PipeChannel {
    kind: TransportKind,
    client: RpcClient,
    child: std::sync::Mutex<Option<Child>>,
}

impl PipeChannel {
    /// Build a channel over arbitrary stream halves, without a handshake.
    /// Callers run [`handshake`](Self::handshake) before exposing it.
    pub fn from_io<R, W>(kind: TransportKind, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            kind,
            client: RpcClient::new(reader, writer),
            child: std::sync::Mutex::new(None),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client.set_request_timeout(timeout);
        self
    }

    /// Spawn `command`, wire its stdio, and complete the handshake.
    /// A handshake failure kills the fresh process before returning.
    pub async fn connect(
        kind: TransportKind,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        working_dir: Option<&str>,
    ) -> Result<Self, ChannelError> {
        let mut child = spawn_helper(command, args, env, working_dir).await?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChannelError::ConnectFailed("helper stdout not captured".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ChannelError::ConnectFailed("helper stdin not captured".into()))?;

        let channel = Self {
            kind,
            client: RpcClient::new(stdout, stdin),
            child: std::sync::Mutex::new(Some(child)),
        };

        if let Err(e) = channel.handshake().await {
            channel.kill_child();
            return Err(e);
        }
        Ok(channel)
    }

    /// Run the tool-capability handshake.
    pub async fn handshake(&self) -> Result<(), ChannelError> {
        super::initialize(&self.client).await
    }

    fn kill_child(&self) {
        let mut guard = self.child.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(child) = guard.as_mut() {
            let _ = child.start_kill();
        }
        *guard = None;
    }
}

#[async_trait]
impl ToolChannel for PipeChannel {
    fn transport(&self) -> TransportKind {
        self.kind
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ChannelError> {
        super::query_tools(&self.client).await
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ChannelError> {
        super::invoke_tool(&self.client, call).await
    }

    async fn close(&self) {
        self.client.shutdown();
        self.kill_child();
    }
}

impl Drop for PipeChannel {
    fn drop(&mut self) {
        self.kill_child();
    }
}
