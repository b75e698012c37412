//! Static server definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The physical channel used to reach a tool-providing server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// A helper process spawned by the built-in lifecycle manager,
    /// speaking the pipe protocol over its stdio.
    PipeLocal,
    /// An externally configured command, spawned the same way but owned
    /// by the external connector.
    PipeExternal,
    /// An outbound socket connection to an already-running server.
    SocketOutbound,
}

impl TransportKind {
    pub fn as_str(&self) -> &str {
        match self {
            TransportKind::PipeLocal => "pipe-local",
            TransportKind::PipeExternal => "pipe-external",
            TransportKind::SocketOutbound => "socket-outbound",
        }
    }

    /// Whether this transport is established by spawning a process.
    pub fn is_process_based(&self) -> bool {
        matches!(self, TransportKind::PipeLocal | TransportKind::PipeExternal)
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static definition of a tool-providing server.
///
/// `command`/`args`/`working_dir`/`env` apply to process-based transports;
/// `url`/`headers` apply to socket transports. Unused fields stay empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Unique key; also the key of the server's live handle, if any
    pub name: String,
    /// How the server is reached
    pub transport: TransportKind,
    /// Disabled descriptors are kept but never connected
    pub enabled: bool,
    /// Command to spawn (process-based transports)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments for the command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Working directory for the spawned process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Extra environment variables for the spawned process
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Target address (socket transports)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Connection headers (socket transports); parsed and kept for
    /// forward compatibility, not sent by the TCP connector
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl ServerDescriptor {
    fn new(name: impl Into<String>, transport: TransportKind) -> Self {
        Self {
            name: name.into(),
            transport,
            enabled: true,
            command: None,
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
        }
    }

    /// A built-in server spawned by the lifecycle manager.
    pub fn pipe_local(
        name: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut descriptor = Self::new(name, TransportKind::PipeLocal);
        descriptor.command = Some(command.into());
        descriptor.args = args.into_iter().map(Into::into).collect();
        descriptor
    }

    /// An externally configured command.
    pub fn pipe_external(
        name: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut descriptor = Self::new(name, TransportKind::PipeExternal);
        descriptor.command = Some(command.into());
        descriptor.args = args.into_iter().map(Into::into).collect();
        descriptor
    }

    /// An outbound socket server.
    pub fn socket_outbound(name: impl Into<String>, url: impl Into<String>) -> Self {
        let mut descriptor = Self::new(name, TransportKind::SocketOutbound);
        descriptor.url = Some(url.into());
        descriptor
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
