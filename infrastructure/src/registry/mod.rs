//! Connection Registry
//!
//! The [`ConnectionRegistry`] is the single source of truth for "what tools
//! exist and who serves them". It owns one live [`ToolChannel`] per
//! connected server — whatever the transport — plus the routing table
//! derived from their catalogs, and implements [`ToolBrokerPort`] for the
//! agent loop.
//!
//! # Usage
//!
//! ```ignore
//! use conduit_infrastructure::registry::ConnectionRegistry;
//!
//! let registry = ConnectionRegistry::with_builtin_servers();
//!
//! // Spawn the built-in helpers and connect externally configured servers
//! registry.start_builtin_servers().await;
//! connect_external_servers(&registry, &root).await;
//!
//! // Uniform invocation, wherever the tool lives
//! let call = ToolCall::new("read_file").with_arg("path", "README.md");
//! let result = registry.call_tool(&call).await?;
//! ```
//!
//! # Routing
//!
//! `call_tool` resolves the owning server through the routing table in
//! O(1). The table is a cache, not a source of truth: on a miss the
//! registry scans every live handle's catalog in turn, and only when the
//! scan exhausts all handles does the call fail with "tool not found". A
//! fallback hit repairs the table entry, and a server's entries are pruned
//! when it is stopped or replaced, so the scan stays the exception path.
//!
//! # Failure translation
//!
//! Transport failures never escape as errors from `call_tool`: a dead
//! channel yields a `SERVICE_UNAVAILABLE` result, a timed-out call a
//! `TIMEOUT` result. The only `call_tool` error is "tool not found",
//! because that is the one condition the caller cannot learn from a result
//! value.

pub mod lifecycle;

use async_trait::async_trait;
use conduit_application::ports::tool_broker::{BrokerError, ServerTool, ToolBrokerPort};
use conduit_application::ports::process::ProcessControl;
use conduit_domain::routing::RoutingTable;
use conduit_domain::server::{ServerDescriptor, TransportKind};
use conduit_domain::tool::entities::ToolCall;
use conduit_domain::tool::value_objects::{ToolError, ToolResult};
use conduit_domain::transport::{ChannelError, ToolChannel};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::channels::{PipeChannel, SocketChannel};

pub use lifecycle::{ServerStatus, builtin_descriptors};

type HandleMap = HashMap<String, Arc<dyn ToolChannel>>;

/// Owner of all live transport handles and the routing table.
pub struct ConnectionRegistry {
    /// Static server definitions, keyed by name
    descriptors: RwLock<HashMap<String, ServerDescriptor>>,
    /// Live channels, keyed by server name. Exactly one per name.
    handles: RwLock<HandleMap>,
    /// Derived index: tool name → server name
    routing: RwLock<RoutingTable>,
    /// Helper processes owned by the built-in lifecycle manager. Presence
    /// in this map IS the running state.
    subprocesses: tokio::sync::Mutex<HashMap<String, Box<dyn ProcessControl>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
            handles: RwLock::new(HashMap::new()),
            routing: RwLock::new(RoutingTable::new()),
            subprocesses: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Record a server definition. No side effects on live connections.
    pub fn register_server(&self, descriptor: ServerDescriptor) {
        let mut descriptors = self.descriptors.write().unwrap_or_else(|e| e.into_inner());
        descriptors.insert(descriptor.name.clone(), descriptor);
    }

    /// Forget a server definition. No side effects on live connections.
    pub fn unregister_server(&self, name: &str) -> bool {
        let mut descriptors = self.descriptors.write().unwrap_or_else(|e| e.into_inner());
        descriptors.remove(name).is_some()
    }

    pub fn descriptor(&self, name: &str) -> Option<ServerDescriptor> {
        let descriptors = self.descriptors.read().unwrap_or_else(|e| e.into_inner());
        descriptors.get(name).cloned()
    }

    /// Spawn `command` and register it as the pipe server `name`.
    ///
    /// The handshake and the catalog query run before anything is stored,
    /// so a failure leaves no partially registered handle behind. Returns
    /// the number of tools merged into the routing table.
    pub async fn connect_pipe(
        &self,
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        working_dir: Option<&str>,
    ) -> Result<usize, ChannelError> {
        let kind = match self.descriptor(name) {
            Some(descriptor) if descriptor.transport.is_process_based() => descriptor.transport,
            _ => TransportKind::PipeExternal,
        };
        let channel = PipeChannel::connect(kind, command, args, env, working_dir).await?;
        self.attach_channel(name, Arc::new(channel)).await
    }

    /// Open an outbound socket to `url` and register it as server `name`.
    pub async fn connect_socket(&self, name: &str, url: &str) -> Result<usize, ChannelError> {
        let channel = SocketChannel::connect(url).await?;
        self.attach_channel(name, Arc::new(channel)).await
    }

    /// Store a freshly handshaken channel and merge its catalog.
    ///
    /// The catalog query happens first: if it fails the channel is closed
    /// and nothing is registered. Reconnecting replaces any previous
    /// channel under the same name (and prunes its routing entries), it
    /// does not stack.
    pub async fn attach_channel(
        &self,
        name: &str,
        channel: Arc<dyn ToolChannel>,
    ) -> Result<usize, ChannelError> {
        let tools = match channel.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                channel.close().await;
                return Err(e);
            }
        };

        let replaced = {
            let mut handles = self.handles.write().unwrap_or_else(|e| e.into_inner());
            handles.insert(name.to_string(), channel)
        };
        if let Some(old) = replaced {
            debug!(server = name, "replacing existing channel");
            old.close().await;
        }

        let merged = {
            let mut routing = self.routing.write().unwrap_or_else(|e| e.into_inner());
            routing.remove_server(name);
            routing.merge(name, tools.iter().map(|t| t.name.clone()))
        };
        info!(server = name, tools = merged, "server connected");
        Ok(merged)
    }

    /// Close and forget the server's channel, pruning its routing entries.
    /// The descriptor and any subprocess record are untouched.
    pub async fn disconnect_server(&self, name: &str) -> bool {
        let removed = {
            let mut handles = self.handles.write().unwrap_or_else(|e| e.into_inner());
            handles.remove(name)
        };
        let Some(channel) = removed else {
            return false;
        };
        channel.close().await;

        let pruned = {
            let mut routing = self.routing.write().unwrap_or_else(|e| e.into_inner());
            routing.remove_server(name)
        };
        debug!(server = name, pruned, "server disconnected");
        true
    }

    fn handle(&self, name: &str) -> Option<Arc<dyn ToolChannel>> {
        let handles = self.handles.read().unwrap_or_else(|e| e.into_inner());
        handles.get(name).cloned()
    }

    fn handle_snapshot(&self) -> Vec<(String, Arc<dyn ToolChannel>)> {
        let handles = self.handles.read().unwrap_or_else(|e| e.into_inner());
        handles
            .iter()
            .map(|(name, channel)| (name.clone(), Arc::clone(channel)))
            .collect()
    }

    /// Every advertised tool across all live servers, tagged with its
    /// owner. Catalogs are queried concurrently; a failing server is
    /// logged and excluded rather than propagated.
    pub async fn list_tools(&self) -> Vec<ServerTool> {
        let snapshot = self.handle_snapshot();
        let queries = snapshot.into_iter().map(|(name, channel)| async move {
            let result = channel.list_tools().await;
            (name, result)
        });

        let mut tools = Vec::new();
        for (name, result) in futures::future::join_all(queries).await {
            match result {
                Ok(server_tools) => {
                    tools.extend(server_tools.into_iter().map(|tool| ServerTool {
                        server: name.clone(),
                        tool,
                    }));
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "catalog query failed, excluding server");
                }
            }
        }
        tools
    }

    /// Invoke a tool by name, wherever it lives.
    ///
    /// Routing-table hit → O(1) dispatch. Miss → scan live catalogs in
    /// turn; a hit repairs the table. Only after the scan exhausts every
    /// handle does this return [`BrokerError::ToolNotFound`].
    pub async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, BrokerError> {
        let owner = {
            let routing = self.routing.read().unwrap_or_else(|e| e.into_inner());
            routing.owner(&call.tool_name).map(str::to_string)
        };
        if let Some(server) = owner
            && let Some(channel) = self.handle(&server)
        {
            return Ok(self.invoke(&server, &channel, call).await);
        }

        // Stale or missing entry: fall back to scanning live catalogs.
        debug!(tool = %call.tool_name, "routing miss, scanning live catalogs");
        for (server, channel) in self.handle_snapshot() {
            match channel.list_tools().await {
                Ok(tools) if tools.iter().any(|t| t.name == call.tool_name) => {
                    {
                        let mut routing = self.routing.write().unwrap_or_else(|e| e.into_inner());
                        routing.insert(call.tool_name.clone(), server.clone());
                    }
                    debug!(tool = %call.tool_name, server = %server, "fallback scan repaired routing entry");
                    return Ok(self.invoke(&server, &channel, call).await);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(server = %server, error = %e, "catalog scan failed, skipping server");
                }
            }
        }

        Err(BrokerError::ToolNotFound(call.tool_name.clone()))
    }

    /// Routing-table membership check; the optimistic fast path with no
    /// fallback scan.
    pub fn has_tool(&self, name: &str) -> bool {
        let routing = self.routing.read().unwrap_or_else(|e| e.into_inner());
        routing.contains(name)
    }

    async fn invoke(
        &self,
        server: &str,
        channel: &Arc<dyn ToolChannel>,
        call: &ToolCall,
    ) -> ToolResult {
        match channel.call_tool(call).await {
            Ok(result) => result,
            Err(e) => translate_channel_error(server, &call.tool_name, e),
        }
    }

    /// Stop every managed subprocess, close every channel, and clear all
    /// in-memory tables. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.stop_all_servers().await;

        let drained: Vec<Arc<dyn ToolChannel>> = {
            let mut handles = self.handles.write().unwrap_or_else(|e| e.into_inner());
            handles.drain().map(|(_, channel)| channel).collect()
        };
        for channel in drained {
            channel.close().await;
        }

        {
            let mut routing = self.routing.write().unwrap_or_else(|e| e.into_inner());
            routing.clear();
        }
        {
            let mut descriptors = self.descriptors.write().unwrap_or_else(|e| e.into_inner());
            descriptors.clear();
        }
        debug!("registry shut down");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a transport-level failure into the result value the caller sees.
/// Timeouts and remote-reported errors stay distinguishable from a downed
/// channel.
fn translate_channel_error(server: &str, tool: &str, error: ChannelError) -> ToolResult {
    let tool_error = match error {
        ChannelError::Timeout(operation) => ToolError::timeout(operation),
        ChannelError::Remote { code, message } => {
            ToolError::execution_failed(message).with_details(format!("remote code {}", code))
        }
        ChannelError::Protocol(message) => ToolError::execution_failed(message),
        ChannelError::NotImplemented(message) => ToolError::execution_failed(message),
        ChannelError::Closed
        | ChannelError::Io(_)
        | ChannelError::ConnectFailed(_)
        | ChannelError::HandshakeFailed(_) => ToolError::unavailable(
            format!("server '{}' is unreachable", server),
            &[tool.to_string()],
            "Reconnect or restart the server and retry.",
        ),
    };
    ToolResult::failure(tool, tool_error)
}

#[async_trait]
impl ToolBrokerPort for ConnectionRegistry {
    async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, BrokerError> {
        ConnectionRegistry::call_tool(self, call).await
    }

    async fn list_tools(&self) -> Vec<ServerTool> {
        ConnectionRegistry::list_tools(self).await
    }

    fn has_tool(&self, name: &str) -> bool {
        ConnectionRegistry::has_tool(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_domain::tool::entities::ToolDefinition;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Instrumented channel: counts catalog queries and invocations, and
    /// lets tests change the advertised catalog after attachment.
    struct CountingChannel {
        tools: Mutex<Vec<String>>,
        list_calls: AtomicUsize,
        invoke_calls: AtomicUsize,
        broken: std::sync::atomic::AtomicBool,
    }

    impl CountingChannel {
        fn new(tools: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                tools: Mutex::new(tools.iter().map(|t| t.to_string()).collect()),
                list_calls: AtomicUsize::new(0),
                invoke_calls: AtomicUsize::new(0),
                broken: std::sync::atomic::AtomicBool::new(false),
            })
        }

        fn add_tool(&self, name: &str) {
            self.tools.lock().unwrap().push(name.to_string());
        }

        fn break_channel(&self) {
            self.broken.store(true, Ordering::SeqCst);
        }

        fn list_count(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolChannel for CountingChannel {
        fn transport(&self) -> TransportKind {
            TransportKind::PipeLocal
        }

        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ChannelError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.broken.load(Ordering::SeqCst) {
                return Err(ChannelError::Closed);
            }
            Ok(self
                .tools
                .lock()
                .unwrap()
                .iter()
                .map(|name| ToolDefinition::new(name, "test tool"))
                .collect())
        }

        async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ChannelError> {
            self.invoke_calls.fetch_add(1, Ordering::SeqCst);
            if self.broken.load(Ordering::SeqCst) {
                return Err(ChannelError::Closed);
            }
            Ok(ToolResult::success(&call.tool_name, "counted"))
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_attach_builds_routing_and_tags_tools() {
        let registry = ConnectionRegistry::new();
        let channel = CountingChannel::new(&["read_file", "write_file"]);

        let merged = registry.attach_channel("workspace", channel).await.unwrap();
        assert_eq!(merged, 2);
        assert!(registry.has_tool("read_file"));

        let tools = registry.list_tools().await;
        assert_eq!(tools.len(), 2);
        assert!(tools.iter().all(|t| t.server == "workspace"));
    }

    #[tokio::test]
    async fn test_routed_call_never_scans() {
        let registry = ConnectionRegistry::new();
        let channel = CountingChannel::new(&["read_file"]);
        registry
            .attach_channel("workspace", channel.clone())
            .await
            .unwrap();
        let after_attach = channel.list_count();

        let result = registry
            .call_tool(&ToolCall::new("read_file"))
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(channel.list_count(), after_attach);
    }

    #[tokio::test]
    async fn test_fallback_scan_finds_and_repairs() {
        let registry = ConnectionRegistry::new();
        let channel = CountingChannel::new(&["read_file"]);
        registry
            .attach_channel("workspace", channel.clone())
            .await
            .unwrap();

        // The server grows a tool the routing table has never seen.
        channel.add_tool("grep_search");
        assert!(!registry.has_tool("grep_search"));

        let result = registry
            .call_tool(&ToolCall::new("grep_search"))
            .await
            .unwrap();
        assert!(result.is_success());

        // Repaired: the next call routes without another scan.
        assert!(registry.has_tool("grep_search"));
        let scans_before = channel.list_count();
        registry
            .call_tool(&ToolCall::new("grep_search"))
            .await
            .unwrap();
        assert_eq!(channel.list_count(), scans_before);
    }

    #[tokio::test]
    async fn test_tool_not_found_only_after_full_scan() {
        let registry = ConnectionRegistry::new();
        let first = CountingChannel::new(&["alpha"]);
        let second = CountingChannel::new(&["beta"]);
        registry
            .attach_channel("one", first.clone())
            .await
            .unwrap();
        registry
            .attach_channel("two", second.clone())
            .await
            .unwrap();
        let (scans_one, scans_two) = (first.list_count(), second.list_count());

        let err = registry
            .call_tool(&ToolCall::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::ToolNotFound(name) if name == "missing"));

        // Both catalogs were consulted before giving up.
        assert_eq!(first.list_count(), scans_one + 1);
        assert_eq!(second.list_count(), scans_two + 1);
    }

    #[tokio::test]
    async fn test_broken_catalog_excluded_from_list() {
        let registry = ConnectionRegistry::new();
        let healthy = CountingChannel::new(&["alpha"]);
        let failing = CountingChannel::new(&["beta"]);
        registry
            .attach_channel("one", healthy.clone())
            .await
            .unwrap();
        registry
            .attach_channel("two", failing.clone())
            .await
            .unwrap();
        failing.break_channel();

        let tools = registry.list_tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].server, "one");
    }

    #[tokio::test]
    async fn test_dead_channel_yields_unavailable_result() {
        let registry = ConnectionRegistry::new();
        let channel = CountingChannel::new(&["alpha"]);
        registry
            .attach_channel("one", channel.clone())
            .await
            .unwrap();
        channel.break_channel();

        let result = registry.call_tool(&ToolCall::new("alpha")).await.unwrap();
        assert!(!result.is_success());
        assert!(result.error().unwrap().is_unavailable());
    }

    #[tokio::test]
    async fn test_attach_failure_registers_nothing() {
        let registry = ConnectionRegistry::new();
        let channel = CountingChannel::new(&["alpha"]);
        channel.break_channel();

        let err = registry
            .attach_channel("one", channel.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Closed));
        assert!(registry.handle("one").is_none());
        assert!(!registry.has_tool("alpha"));
    }

    #[tokio::test]
    async fn test_reconnect_replaces_handle_and_routes() {
        let registry = ConnectionRegistry::new();
        let old = CountingChannel::new(&["alpha", "old_only"]);
        let new = CountingChannel::new(&["alpha", "new_only"]);

        registry.attach_channel("one", old).await.unwrap();
        registry
            .attach_channel("one", new.clone())
            .await
            .unwrap();

        assert!(registry.has_tool("new_only"));
        assert!(!registry.has_tool("old_only"));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let registry = ConnectionRegistry::new();
        registry.register_server(ServerDescriptor::pipe_local("x", "conduit", ["serve", "x"]));
        registry
            .attach_channel("x", CountingChannel::new(&["alpha"]))
            .await
            .unwrap();

        registry.shutdown().await;
        assert!(!registry.has_tool("alpha"));
        assert!(registry.descriptor("x").is_none());

        // Second shutdown is a no-op, not a panic.
        registry.shutdown().await;
    }
}
