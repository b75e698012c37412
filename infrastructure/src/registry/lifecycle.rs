//! Built-in server lifecycle manager
//!
//! On-demand process supervision for the fixed catalog of built-in tool
//! servers. "Running" is represented purely as presence in the registry's
//! subprocess table — never by polling the OS — which is what keeps
//! start/stop idempotent and testable with fake process handles.
//!
//! Built-in servers are this executable re-invoked: `conduit serve
//! workspace`, `conduit serve shell`, and `conduit gateway` for the
//! browser bridge. One failed spawn logs and reports `false`; it never
//! aborts a broader startup sequence.

use async_trait::async_trait;
use conduit_application::ports::process::ProcessControl;
use conduit_domain::server::{ServerDescriptor, TransportKind};
use serde::Serialize;
use std::sync::Arc;
use tokio::process::Child;
use tracing::{debug, info, warn};

use super::ConnectionRegistry;
use crate::channels::pipe::{PipeChannel, spawn_helper};

/// Names of the built-in servers, in startup order.
pub const BUILTIN_SERVERS: [&str; 3] = ["workspace", "shell", "browser"];

/// Descriptors for the built-in catalog, all spawning the current
/// executable with the matching subcommand.
pub fn builtin_descriptors() -> Vec<ServerDescriptor> {
    let exe = std::env::current_exe()
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "conduit".to_string());

    vec![
        ServerDescriptor::pipe_local("workspace", &exe, ["serve", "workspace"]),
        ServerDescriptor::pipe_local("shell", &exe, ["serve", "shell"]),
        ServerDescriptor::pipe_local("browser", &exe, ["gateway"]),
    ]
}

/// Descriptor plus live state, for observability.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub descriptor: ServerDescriptor,
    /// A live channel exists for this name
    pub connected: bool,
    /// A subprocess record exists for this name (built-in servers only)
    pub running: bool,
}

/// A spawned helper process tracked in the subprocess table.
pub struct ChildProcess(Child);

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self(child)
    }
}

#[async_trait]
impl ProcessControl for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.0.id()
    }

    async fn terminate(&mut self) -> std::io::Result<()> {
        // start_kill on an already-exited child reports InvalidInput;
        // that is the idempotent success case.
        match self.0.start_kill() {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        let _ = self.0.wait().await;
        Ok(())
    }
}

impl ConnectionRegistry {
    /// A registry pre-loaded with the built-in server catalog.
    pub fn with_builtin_servers() -> Self {
        let registry = Self::new();
        for descriptor in builtin_descriptors() {
            registry.register_server(descriptor);
        }
        registry
    }

    /// Start one built-in server on demand.
    ///
    /// No-op success if it is already running. Spawn, handshake, or
    /// catalog failures are logged and reported as `false` rather than
    /// thrown, so one failed server does not abort startup.
    pub async fn start_builtin_server(&self, name: &str) -> bool {
        {
            let subprocesses = self.subprocesses.lock().await;
            if subprocesses.contains_key(name) {
                debug!(server = name, "built-in server already running");
                return true;
            }
        }

        let Some(descriptor) = self.descriptor(name) else {
            warn!(server = name, "no descriptor for built-in server");
            return false;
        };
        if descriptor.transport != TransportKind::PipeLocal {
            warn!(server = name, transport = %descriptor.transport, "not a built-in server");
            return false;
        }
        if !descriptor.enabled {
            debug!(server = name, "built-in server disabled");
            return false;
        }
        let Some(command) = descriptor.command.as_deref() else {
            warn!(server = name, "built-in descriptor has no command");
            return false;
        };

        let mut child = match spawn_helper(
            command,
            &descriptor.args,
            &descriptor.env,
            descriptor.working_dir.as_deref(),
        )
        .await
        {
            Ok(child) => child,
            Err(e) => {
                warn!(server = name, error = %e, "failed to spawn built-in server");
                return false;
            }
        };

        let (Some(stdout), Some(stdin)) = (child.stdout.take(), child.stdin.take()) else {
            warn!(server = name, "helper stdio not captured");
            let _ = child.start_kill();
            return false;
        };

        let channel = PipeChannel::from_io(TransportKind::PipeLocal, stdout, stdin);
        if let Err(e) = channel.handshake().await {
            warn!(server = name, error = %e, "built-in server handshake failed");
            let _ = child.start_kill();
            return false;
        }

        match self.attach_channel(name, Arc::new(channel)).await {
            Ok(tools) => {
                info!(server = name, tools, "built-in server started");
                let mut subprocesses = self.subprocesses.lock().await;
                subprocesses.insert(name.to_string(), Box::new(ChildProcess::new(child)));
                true
            }
            Err(e) => {
                warn!(server = name, error = %e, "built-in server catalog query failed");
                let _ = child.start_kill();
                false
            }
        }
    }

    /// Stop a running built-in server.
    ///
    /// Terminates the subprocess and drops both its record and its
    /// channel. Returns `false` if the server was not running, so calling
    /// twice yields `true` then `false`.
    pub async fn stop_server(&self, name: &str) -> bool {
        let record = {
            let mut subprocesses = self.subprocesses.lock().await;
            subprocesses.remove(name)
        };
        let Some(mut process) = record else {
            debug!(server = name, "stop requested but server not running");
            return false;
        };

        self.disconnect_server(name).await;
        if let Err(e) = process.terminate().await {
            warn!(server = name, error = %e, "failed to terminate helper process");
        }
        info!(server = name, "built-in server stopped");
        true
    }

    /// Start every enabled built-in server, continuing past individual
    /// failures. Returns `(started, failed)`.
    pub async fn start_builtin_servers(&self) -> (usize, usize) {
        let mut started = 0;
        let mut failed = 0;
        for name in BUILTIN_SERVERS {
            if self.descriptor(name).is_none() {
                continue;
            }
            if self.start_builtin_server(name).await {
                started += 1;
            } else {
                failed += 1;
            }
        }
        (started, failed)
    }

    /// Stop every running built-in server, continuing past individual
    /// failures.
    pub async fn stop_all_servers(&self) {
        let names: Vec<String> = {
            let subprocesses = self.subprocesses.lock().await;
            subprocesses.keys().cloned().collect()
        };
        for name in names {
            self.stop_server(&name).await;
        }
    }

    /// Descriptor plus running/connected state for every known server.
    /// No side effects.
    pub async fn servers(&self) -> Vec<ServerStatus> {
        let descriptors: Vec<ServerDescriptor> = {
            let descriptors = self.descriptors.read().unwrap_or_else(|e| e.into_inner());
            descriptors.values().cloned().collect()
        };
        let subprocesses = self.subprocesses.lock().await;

        let mut statuses: Vec<ServerStatus> = descriptors
            .into_iter()
            .map(|descriptor| {
                let connected = {
                    let handles = self.handles.read().unwrap_or_else(|e| e.into_inner());
                    handles.contains_key(&descriptor.name)
                };
                let running = subprocesses.contains_key(&descriptor.name);
                ServerStatus {
                    descriptor,
                    connected,
                    running,
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_domain::tool::entities::{ToolCall, ToolDefinition};
    use conduit_domain::tool::value_objects::ToolResult;
    use conduit_domain::transport::{ChannelError, ToolChannel};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeProcess {
        terminated: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ProcessControl for FakeProcess {
        fn id(&self) -> Option<u32> {
            Some(7)
        }

        async fn terminate(&mut self) -> std::io::Result<()> {
            self.terminated.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeChannel;

    #[async_trait]
    impl ToolChannel for FakeChannel {
        fn transport(&self) -> TransportKind {
            TransportKind::PipeLocal
        }

        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ChannelError> {
            Ok(vec![ToolDefinition::new("fake_tool", "A fake tool")])
        }

        async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ChannelError> {
            Ok(ToolResult::success(&call.tool_name, "fake"))
        }

        async fn close(&self) {}
    }

    /// Install a fake running server: channel attached, record present.
    async fn install_fake_server(registry: &ConnectionRegistry, name: &str) -> Arc<AtomicBool> {
        registry
            .attach_channel(name, Arc::new(FakeChannel))
            .await
            .unwrap();
        let terminated = Arc::new(AtomicBool::new(false));
        let mut subprocesses = registry.subprocesses.lock().await;
        subprocesses.insert(
            name.to_string(),
            Box::new(FakeProcess {
                terminated: Arc::clone(&terminated),
            }),
        );
        terminated
    }

    #[test]
    fn test_builtin_descriptors_cover_catalog() {
        let descriptors = builtin_descriptors();
        let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();

        assert_eq!(names, BUILTIN_SERVERS);
        assert!(
            descriptors
                .iter()
                .all(|d| d.transport == TransportKind::PipeLocal)
        );
    }

    #[tokio::test]
    async fn test_stop_server_is_idempotent() {
        let registry = ConnectionRegistry::with_builtin_servers();
        let terminated = install_fake_server(&registry, "workspace").await;
        assert!(registry.has_tool("fake_tool"));

        assert!(registry.stop_server("workspace").await);
        assert!(terminated.load(Ordering::SeqCst));
        assert!(!registry.has_tool("fake_tool"));
        assert!(registry.handle("workspace").is_none());

        // Second stop: not running anymore.
        assert!(!registry.stop_server("workspace").await);
    }

    #[tokio::test]
    async fn test_stop_unknown_server_returns_false() {
        let registry = ConnectionRegistry::with_builtin_servers();
        assert!(!registry.stop_server("nope").await);
    }

    #[tokio::test]
    async fn test_start_unknown_server_returns_false() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.start_builtin_server("workspace").await);
    }

    #[tokio::test]
    async fn test_start_is_noop_when_running() {
        let registry = ConnectionRegistry::with_builtin_servers();
        install_fake_server(&registry, "workspace").await;

        // Record present → success without spawning anything.
        assert!(registry.start_builtin_server("workspace").await);
    }

    #[tokio::test]
    async fn test_spawn_failure_reports_false() {
        let registry = ConnectionRegistry::new();
        registry.register_server(ServerDescriptor::pipe_local(
            "workspace",
            "definitely-not-a-real-command-7f3a",
            Vec::<String>::new(),
        ));

        assert!(!registry.start_builtin_server("workspace").await);
        assert!(registry.handle("workspace").is_none());
    }

    #[tokio::test]
    async fn test_servers_reports_state() {
        let registry = ConnectionRegistry::with_builtin_servers();
        install_fake_server(&registry, "shell").await;

        let statuses = registry.servers().await;
        assert_eq!(statuses.len(), 3);

        let shell = statuses
            .iter()
            .find(|s| s.descriptor.name == "shell")
            .unwrap();
        assert!(shell.connected);
        assert!(shell.running);

        let browser = statuses
            .iter()
            .find(|s| s.descriptor.name == "browser")
            .unwrap();
        assert!(!browser.connected);
        assert!(!browser.running);
    }

    #[tokio::test]
    async fn test_stop_all_continues_past_every_server() {
        let registry = ConnectionRegistry::with_builtin_servers();
        let first = install_fake_server(&registry, "workspace").await;
        let second = install_fake_server(&registry, "shell").await;

        registry.stop_all_servers().await;
        assert!(first.load(Ordering::SeqCst));
        assert!(second.load(Ordering::SeqCst));

        let statuses = registry.servers().await;
        assert!(statuses.iter().all(|s| !s.running));
    }
}
