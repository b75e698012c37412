//! Application layer for conduit
//!
//! This crate contains the port definitions the agent loop and the
//! infrastructure adapters meet at. It depends only on the domain layer.

pub mod ports;

// Re-export commonly used types
pub use ports::{BrokerError, ProcessControl, ServerTool, ToolBrokerPort};
