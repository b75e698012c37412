//! JSON-RPC plumbing shared by every transport
//!
//! All conduit channels — pipe helpers, outbound sockets, the gateway link —
//! speak JSON-RPC 2.0 with one compact JSON message per line. The
//! [`RpcClient`] turns that event-style stream into awaitable calls via a
//! correlation map of pending oneshot senders, and is generic over its
//! stream halves so tests can drive it over [`tokio::io::duplex`].

pub mod client;
pub mod protocol;

pub use client::RpcClient;
pub use protocol::{
    IncomingRequest, JsonRpcRequest, JsonRpcResponse, JsonRpcResponseOut, MessageKind, RpcError,
    classify_message,
};
