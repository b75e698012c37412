//! Infrastructure layer for conduit
//!
//! Adapters behind the application-layer ports: the JSON-RPC plumbing
//! every transport shares, the pipe and socket channels, the connection
//! registry with its built-in lifecycle manager, the external connector,
//! the framing relay, the gateway server, and the built-in tool host the
//! helper processes run.

pub mod channels;
pub mod connector;
pub mod gateway;
pub mod host;
pub mod registry;
pub mod relay;
pub mod rpc;

// Re-export commonly used types
pub use channels::{PipeChannel, SocketChannel};
pub use connector::{ConnectReport, connect_external_servers, load_config};
pub use gateway::{GatewayConfig, GatewayServer};
pub use host::{ToolHost, builtin_host, serve_stdio};
pub use registry::{ConnectionRegistry, ServerStatus};
pub use relay::{RelayConfig, RelayError};
pub use rpc::RpcClient;
