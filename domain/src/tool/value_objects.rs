//! Tool domain value objects — immutable result and error types
//!
//! Every tool invocation produces a [`ToolResult`]: either output content or
//! a coded [`ToolError`]. The codes are the contract the orchestration layer
//! keeps with its callers — in particular, a downed channel must stay
//! distinguishable from a missing tool, so `SERVICE_UNAVAILABLE` travels as
//! a result value and never as a transport-level failure.

use serde::{Deserialize, Serialize};

/// Error that occurred during tool invocation.
///
/// | Code | Description |
/// |------|-------------|
/// | `NOT_FOUND` | Unknown tool or resource |
/// | `INVALID_ARGUMENT` | Missing or malformed parameters |
/// | `EXECUTION_FAILED` | The serving side ran the tool and it failed |
/// | `PERMISSION_DENIED` | Access denied |
/// | `TIMEOUT` | No response within the call window |
/// | `SERVICE_UNAVAILABLE` | The tool's channel is down; the tool itself exists |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    /// Error code (e.g., "NOT_FOUND", "SERVICE_UNAVAILABLE")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Common error constructors
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            "NOT_FOUND",
            format!("Resource not found: {}", resource.into()),
        )
    }

    pub fn permission_denied(resource: impl Into<String>) -> Self {
        Self::new(
            "PERMISSION_DENIED",
            format!("Permission denied: {}", resource.into()),
        )
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new("INVALID_ARGUMENT", message)
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::new("EXECUTION_FAILED", message)
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::new(
            "TIMEOUT",
            format!("Operation timed out: {}", operation.into()),
        )
    }

    /// The tool's channel is down. Carries the names of every tool affected
    /// by the outage plus a remediation hint, so the caller can relay a
    /// meaningful message instead of a stack trace.
    pub fn unavailable(
        message: impl Into<String>,
        affected_tools: &[String],
        remediation: impl Into<String>,
    ) -> Self {
        Self::new("SERVICE_UNAVAILABLE", message).with_details(format!(
            "Affected tools: {}. {}",
            affected_tools.join(", "),
            remediation.into()
        ))
    }

    pub fn is_unavailable(&self) -> bool {
        self.code == "SERVICE_UNAVAILABLE"
    }

    pub fn is_timeout(&self) -> bool {
        self.code == "TIMEOUT"
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for ToolError {}

/// Result of a tool invocation, carrying output or error information.
///
/// This is also the wire shape of a `tools/call` response between conduit
/// processes, so it derives serde both ways.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the tool that was invoked
    pub tool_name: String,
    /// Whether the invocation was successful
    pub success: bool,
    /// Output content (for successful invocation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error information (for failed invocation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(tool_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    /// Create a failed result
    pub fn failure(tool_name: impl Into<String>, error: ToolError) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            output: None,
            error: Some(error),
        }
    }

    /// Check if invocation was successful
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Get the output content
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Get the error
    pub fn error(&self) -> Option<&ToolError> {
        self.error.as_ref()
    }
}
