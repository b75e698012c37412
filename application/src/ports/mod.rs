//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod process;
pub mod tool_broker;

pub use process::ProcessControl;
pub use tool_broker::{BrokerError, ServerTool, ToolBrokerPort};
