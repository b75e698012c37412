//! CLI entrypoint for conduit
//!
//! Wires the layers together with dependency injection. The subcommands
//! double as the helper processes the lifecycle manager spawns:
//! `conduit serve <name>` runs a built-in tool host over stdio,
//! `conduit gateway` the browser gateway, and `conduit relay` the framing
//! relay. Logs go to stderr so a helper's stdout stays protocol-clean.

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use conduit_domain::tool::entities::ToolCall;
use conduit_infrastructure::connector::connect_external_servers;
use conduit_infrastructure::gateway::GatewayServer;
use conduit_infrastructure::host::{builtin_host, serve_stdio};
use conduit_infrastructure::registry::ConnectionRegistry;
use conduit_infrastructure::relay::{self, RelayConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "conduit",
    version,
    about = "Uniform tool invocation across heterogeneous transports"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a built-in tool server over stdio
    Serve {
        /// Server name (workspace, shell)
        name: String,
    },

    /// Run the browser gateway server over stdio
    Gateway,

    /// Relay length-prefixed frames between stdio and a socket peer
    Relay {
        /// Socket target, host:port or tcp://host:port
        #[arg(long, default_value = "127.0.0.1:9224")]
        url: String,

        /// Consecutive reconnect attempts before giving up
        #[arg(long, default_value_t = relay::bridge::DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,

        /// Fixed delay between reconnect attempts, in milliseconds
        #[arg(long, default_value_t = 2000)]
        retry_ms: u64,
    },

    /// List every tool advertised by the connected servers
    Tools {
        /// Project root probed for the external server config
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Call a tool by name with JSON arguments
    Call {
        /// Tool name
        tool: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        /// Project root probed for the external server config
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Show descriptor and running state for every known server
    Servers {
        /// Project root probed for the external server config
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity level
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { name } => {
            let Some(host) = builtin_host(&name) else {
                bail!("unknown built-in server: {}", name);
            };
            serve_stdio(&host).await?;
        }

        Command::Gateway => {
            let gateway = GatewayServer::from_env();
            serve_stdio(&gateway).await?;
        }

        Command::Relay {
            url,
            max_attempts,
            retry_ms,
        } => {
            let mut config = RelayConfig::new(url);
            config.max_attempts = max_attempts;
            config.retry_interval = Duration::from_millis(retry_ms);
            relay::run(config).await?;
        }

        Command::Tools { root } => {
            let registry = start_registry(&root).await;
            let mut tools = registry.list_tools().await;
            tools.sort_by(|a, b| (&a.server, &a.tool.name).cmp(&(&b.server, &b.tool.name)));
            for entry in &tools {
                println!(
                    "{:<12} {:<24} {}",
                    entry.server, entry.tool.name, entry.tool.description
                );
            }
            registry.shutdown().await;
        }

        Command::Call { tool, args, root } => {
            let arguments: serde_json::Value = serde_json::from_str(&args)
                .map_err(|e| anyhow::anyhow!("--args is not a JSON object: {}", e))?;
            let registry = start_registry(&root).await;
            let call = ToolCall::from_value(&tool, &arguments);
            let outcome = registry.call_tool(&call).await;
            registry.shutdown().await;

            match outcome {
                Ok(result) => {
                    if let Some(error) = result.error() {
                        bail!("{}", error);
                    }
                    println!("{}", result.output().unwrap_or_default());
                }
                Err(e) => bail!("{}", e),
            }
        }

        Command::Servers { root } => {
            let registry = start_registry(&root).await;
            let statuses = registry.servers().await;
            for status in &statuses {
                println!(
                    "{:<12} {:<16} connected={} running={}",
                    status.descriptor.name,
                    status.descriptor.transport.as_str(),
                    status.connected,
                    status.running
                );
            }
            registry.shutdown().await;
        }
    }

    Ok(())
}

/// Bring up the registry: built-in servers first, then anything the
/// external configuration names. Individual failures are logged, never
/// fatal.
async fn start_registry(root: &Path) -> ConnectionRegistry {
    let registry = ConnectionRegistry::with_builtin_servers();

    let (started, failed) = registry.start_builtin_servers().await;
    info!(started, failed, "built-in servers started");

    let report = connect_external_servers(&registry, root).await;
    if report.failed > 0 {
        for failure in &report.errors {
            warn!(server = %failure.server, error = %failure.error, "external server skipped");
        }
    }
    if report.connected > 0 {
        info!(connected = report.connected, "external servers connected");
    }

    registry
}
