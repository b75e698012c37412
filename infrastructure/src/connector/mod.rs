//! External Connector
//!
//! Bootstraps additional tool servers from the declarative configuration
//! document at process start. Each entry is dispatched to its
//! transport-specific connector; failures are tallied per server and never
//! abort the loop, so two good servers still come up when the one between
//! them is broken.

pub mod config;

use std::path::Path;
use tracing::{info, warn};

use crate::registry::ConnectionRegistry;

pub use config::{ConfigError, ExternalConfig, ExternalServerEntry, TransportConfig, load_config};

/// One failed connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectFailure {
    pub server: String,
    pub error: String,
}

/// Tally of one connector run.
#[derive(Debug, Clone, Default)]
pub struct ConnectReport {
    pub connected: usize,
    pub failed: usize,
    pub errors: Vec<ConnectFailure>,
}

impl ConnectReport {
    fn record_failure(&mut self, server: &str, error: impl std::fmt::Display) {
        warn!(server = %server, error = %error, "external server connection failed");
        self.failed += 1;
        self.errors.push(ConnectFailure {
            server: server.to_string(),
            error: error.to_string(),
        });
    }
}

/// Load the configuration under `root` and connect every enabled entry.
///
/// A malformed config document is reported in the tally (and logged) but
/// does not crash startup — it behaves like a config naming zero servers.
pub async fn connect_external_servers(
    registry: &ConnectionRegistry,
    root: &Path,
) -> ConnectReport {
    let mut report = ConnectReport::default();

    let config = match load_config(root) {
        Ok(config) => config,
        Err(e) => {
            report.record_failure("(config)", e);
            return report;
        }
    };

    for entry in &config.servers {
        registry.register_server(entry.descriptor());

        if !entry.enabled {
            info!(server = %entry.name, "external server disabled, skipping");
            continue;
        }

        let result = match &entry.transport {
            TransportConfig::PipeExternal {
                command,
                args,
                env,
                cwd,
            } => {
                registry
                    .connect_pipe(&entry.name, command, args, env, cwd.as_deref())
                    .await
            }
            TransportConfig::SocketOutbound { url, .. } => {
                registry.connect_socket(&entry.name, url).await
            }
            TransportConfig::SocketInbound { .. } => {
                // Reserved: parse it, refuse to connect it, keep going.
                Err(conduit_domain::transport::ChannelError::NotImplemented(
                    "socket-inbound transport is not implemented".into(),
                ))
            }
        };

        match result {
            Ok(tools) => {
                info!(server = %entry.name, tools, "external server connected");
                report.connected += 1;
            }
            Err(e) => report.record_failure(&entry.name, e),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host;
    use conduit_domain::tool::entities::ToolCall;
    use tokio::net::TcpListener;

    /// Serve a built-in host on an ephemeral TCP port, returning its addr.
    async fn hosted_server(make_host: fn() -> host::ToolHost) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (read_half, write_half) = stream.into_split();
                    let server = make_host();
                    let _ = host::serve::serve_loop(&server, read_half, write_half).await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_middle_failure_leaves_siblings_connected() {
        let first = hosted_server(host::workspace_host).await;
        let third = hosted_server(host::shell_host).await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("conduit.servers.json"),
            format!(
                r#"{{"version": 1, "servers": [
                    {{"name": "files", "transport": {{"type": "socket-outbound", "url": "{first}"}}}},
                    {{"name": "broken", "transport":
                        {{"type": "pipe-external", "command": "definitely-not-a-real-command-7f3a"}}}},
                    {{"name": "commands", "transport": {{"type": "socket-outbound", "url": "{third}"}}}}
                ]}}"#
            ),
        )
        .unwrap();
        let registry = ConnectionRegistry::new();

        let report = connect_external_servers(&registry, dir.path()).await;
        assert_eq!(report.connected, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].server, "broken");

        // The surviving servers answer calls.
        assert!(registry.has_tool("read_file"));
        assert!(registry.has_tool("run_command"));
        let result = registry
            .call_tool(&ToolCall::new("run_command").with_arg("command", "echo connector"))
            .await
            .unwrap();
        assert!(result.is_success());

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_config_connects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new();

        let report = connect_external_servers(&registry, dir.path()).await;
        assert_eq!(report.connected, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_malformed_config_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("conduit.servers.json"), "{broken").unwrap();
        let registry = ConnectionRegistry::new();

        let report = connect_external_servers(&registry, dir.path()).await;
        assert_eq!(report.connected, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].error.contains("Malformed"));
    }

    #[tokio::test]
    async fn test_disabled_entries_are_skipped_but_registered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("conduit.servers.json"),
            r#"{"version": 1, "servers": [
                {"name": "off", "enabled": false,
                 "transport": {"type": "pipe-external", "command": "whatever"}}
            ]}"#,
        )
        .unwrap();
        let registry = ConnectionRegistry::new();

        let report = connect_external_servers(&registry, dir.path()).await;
        assert_eq!(report.connected, 0);
        assert_eq!(report.failed, 0);
        assert!(registry.descriptor("off").is_some());
    }

    #[tokio::test]
    async fn test_reserved_transport_surfaces_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("conduit.servers.json"),
            r#"{"version": 1, "servers": [
                {"name": "listener", "transport": {"type": "socket-inbound"}}
            ]}"#,
        )
        .unwrap();
        let registry = ConnectionRegistry::new();

        let report = connect_external_servers(&registry, dir.path()).await;
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].error.contains("not implemented"));
    }

    #[tokio::test]
    async fn test_one_bad_entry_does_not_abort_the_loop() {
        // Both entries fail (bogus command, dead socket), but both are
        // attempted and tallied.
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("conduit.servers.json"),
            r#"{"version": 1, "servers": [
                {"name": "ghost", "transport":
                    {"type": "pipe-external", "command": "definitely-not-a-real-command-7f3a"}},
                {"name": "dead-socket", "transport":
                    {"type": "socket-outbound", "url": "127.0.0.1:1"}}
            ]}"#,
        )
        .unwrap();
        let registry = ConnectionRegistry::new();

        let report = connect_external_servers(&registry, dir.path()).await;
        assert_eq!(report.connected, 0);
        assert_eq!(report.failed, 2);
        let failed: Vec<&str> = report.errors.iter().map(|e| e.server.as_str()).collect();
        assert_eq!(failed, vec!["ghost", "dead-socket"]);
    }
}
