//! Domain layer for conduit
//!
//! This crate contains the core entities and value objects of the tool
//! orchestration layer. It has no dependencies on infrastructure concerns —
//! no sockets, no processes, no files.
//!
//! # Core Concepts
//!
//! ## Uniform tool invocation
//!
//! An agent calls tools by name. Which server provides a tool, and which
//! physical transport reaches that server, is resolved behind the
//! [`ToolChannel`] seam:
//!
//! - **ToolDefinition / ToolCall / ToolResult** — the tool vocabulary
//! - **ServerDescriptor** — static definition of a tool-providing server
//! - **RoutingTable** — derived index from tool name to owning server
//! - **ToolChannel** — one live connection, whatever the transport
//! - **ReconnectState** — bounded-burst bookkeeping for unreliable links

pub mod routing;
pub mod server;
pub mod tool;
pub mod transport;

// Re-export commonly used types
pub use routing::RoutingTable;
pub use server::{ServerDescriptor, TransportKind};
pub use tool::{
    entities::{ToolCall, ToolDefinition},
    value_objects::{ToolError, ToolResult},
};
pub use transport::{ChannelError, ToolChannel, reconnect::ReconnectState};
