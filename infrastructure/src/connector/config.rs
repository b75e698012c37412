//! External server configuration document
//!
//! A declarative JSON list of additional tool servers, loaded from the
//! first match in a short ordered probe list under the project root.
//! Absence of the file is a valid configuration (zero external servers);
//! a present-but-malformed file is an error the caller reports without
//! crashing startup.

use conduit_domain::server::ServerDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Candidate config locations relative to the project root, probed in
/// order; the first that exists wins.
pub const CONFIG_CANDIDATES: [&str; 2] = ["conduit.servers.json", ".conduit/servers.json"];

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// The configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub servers: Vec<ExternalServerEntry>,
}

/// One configured server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalServerEntry {
    pub name: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    pub transport: TransportConfig,
}

fn enabled_default() -> bool {
    true
}

/// Transport descriptor, tagged by `type`.
///
/// `socket-inbound` is reserved for servers that would dial into us; it
/// parses but connecting to it reports "not implemented".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransportConfig {
    PipeExternal {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        cwd: Option<String>,
    },
    SocketOutbound {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    SocketInbound {
        #[serde(default)]
        url: Option<String>,
    },
}

impl ExternalServerEntry {
    /// The static descriptor this entry defines.
    pub fn descriptor(&self) -> ServerDescriptor {
        let mut descriptor = match &self.transport {
            TransportConfig::PipeExternal {
                command,
                args,
                env,
                cwd,
            } => {
                let mut d = ServerDescriptor::pipe_external(&self.name, command, args.clone());
                d.env = env.clone();
                d.working_dir = cwd.clone();
                d
            }
            TransportConfig::SocketOutbound { url, headers } => {
                let mut d = ServerDescriptor::socket_outbound(&self.name, url);
                d.headers = headers.clone();
                d
            }
            // Reserved transport: keep a descriptor so the server shows up
            // in observability output, with no connectable endpoint.
            TransportConfig::SocketInbound { url } => ServerDescriptor::socket_outbound(
                &self.name,
                url.clone().unwrap_or_default(),
            ),
        };
        descriptor.enabled = self.enabled;
        descriptor
    }
}

/// Probe the candidate locations under `root` and parse the first config
/// file that exists. No file at all yields an empty, valid configuration.
pub fn load_config(root: &Path) -> Result<ExternalConfig, ConfigError> {
    for candidate in CONFIG_CANDIDATES {
        let path = root.join(candidate);
        if !path.exists() {
            continue;
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Unreadable {
                path: path.clone(),
                source,
            })?;
        return serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed { path, source });
    }
    Ok(ExternalConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_domain::server::TransportKind;

    #[test]
    fn test_missing_config_is_empty_and_valid() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();

        assert_eq!(config.servers.len(), 0);
    }

    #[test]
    fn test_first_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("conduit.servers.json"),
            r#"{"version": 1, "servers": [{"name": "primary", "transport": {"type": "socket-outbound", "url": "127.0.0.1:9000"}}]}"#,
        )
        .unwrap();
        std::fs::create_dir(dir.path().join(".conduit")).unwrap();
        std::fs::write(
            dir.path().join(".conduit/servers.json"),
            r#"{"version": 1, "servers": []}"#,
        )
        .unwrap();

        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].name, "primary");
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("conduit.servers.json"), "{not json").unwrap();

        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn test_entry_parses_and_builds_descriptor() {
        let config: ExternalConfig = serde_json::from_str(
            r#"{
                "version": 1,
                "servers": [
                    {
                        "name": "linter",
                        "transport": {
                            "type": "pipe-external",
                            "command": "lint-server",
                            "args": ["--stdio"],
                            "env": {"LINT_MODE": "fast"},
                            "cwd": "/work"
                        }
                    },
                    {
                        "name": "inspector",
                        "enabled": false,
                        "transport": {"type": "socket-outbound", "url": "tcp://127.0.0.1:9224"}
                    }
                ]
            }"#,
        )
        .unwrap();

        let linter = config.servers[0].descriptor();
        assert_eq!(linter.transport, TransportKind::PipeExternal);
        assert_eq!(linter.command.as_deref(), Some("lint-server"));
        assert_eq!(linter.args, vec!["--stdio"]);
        assert_eq!(linter.working_dir.as_deref(), Some("/work"));
        assert!(linter.enabled);

        let inspector = config.servers[1].descriptor();
        assert_eq!(inspector.transport, TransportKind::SocketOutbound);
        assert!(!inspector.enabled);
    }

    #[test]
    fn test_reserved_transport_parses() {
        let entry: ExternalServerEntry = serde_json::from_str(
            r#"{"name": "listener", "transport": {"type": "socket-inbound"}}"#,
        )
        .unwrap();

        assert!(matches!(
            entry.transport,
            TransportConfig::SocketInbound { .. }
        ));
    }
}
