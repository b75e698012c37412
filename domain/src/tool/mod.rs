//! Tool domain module
//!
//! Core abstractions for named tools served by tool-providing servers —
//! how an autonomous agent invokes capabilities (file edits, git operations,
//! test runners, browser actions) without knowing which transport carries
//! the call.
//!
//! # Overview
//!
//! Every tool is described by a [`ToolDefinition`] (name, description, JSON
//! Schema for its input), invoked via a [`ToolCall`], and produces a
//! [`ToolResult`] that is either output or a coded [`ToolError`].
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ToolDefinition│───▶│ ToolCall     │───▶│ ToolResult   │
//! │ (catalog)    │    │ (invocation) │    │ (outcome)    │
//! └──────────────┘    └──────────────┘    └──────────────┘
//! ```
//!
//! # Error codes and degradation
//!
//! [`ToolError`] codes let callers distinguish the failure classes the
//! orchestration layer must keep apart:
//!
//! | Code | Meaning |
//! |------|---------|
//! | `NOT_FOUND` | no live server advertises the tool |
//! | `SERVICE_UNAVAILABLE` | the tool exists but its channel is down |
//! | `TIMEOUT` | the call was sent and no response arrived in time |
//! | `EXECUTION_FAILED` | the serving side ran the tool and it failed |
//!
//! `SERVICE_UNAVAILABLE` is a *result value*, never a thrown error: a caller
//! reacting to a dead browser link should degrade gracefully, not crash the
//! session.

pub mod entities;
pub mod value_objects;

pub use entities::{ToolCall, ToolDefinition};
pub use value_objects::{ToolError, ToolResult};
