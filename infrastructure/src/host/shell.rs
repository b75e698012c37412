//! Command execution tool: run_command

use async_trait::async_trait;
use conduit_domain::tool::entities::{ToolCall, ToolDefinition};
use conduit_domain::tool::value_objects::{ToolError, ToolResult};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use super::ToolHandler;

/// Tool name constant
pub const RUN_COMMAND: &str = "run_command";

/// Default timeout for command execution (60 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Maximum output size (1 MB)
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Run a shell command and capture its output.
pub struct RunCommandTool;

#[async_trait]
impl ToolHandler for RunCommandTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            RUN_COMMAND,
            "Execute a shell command and return its output. Use with caution.",
        )
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute",
                },
                "working_dir": {
                    "type": "string",
                    "description": "Working directory for the command",
                },
                "timeout_secs": {
                    "type": "number",
                    "description": "Timeout in seconds (default: 60)",
                },
            },
            "required": ["command"],
        }))
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let command_str = match call.require_string("command") {
            Ok(c) => c,
            Err(e) => return ToolResult::failure(RUN_COMMAND, ToolError::invalid_argument(e)),
        };

        let timeout_secs = call
            .get_i64("timeout_secs")
            .unwrap_or(DEFAULT_TIMEOUT_SECS as i64)
            .max(1) as u64;

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command_str]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command_str]);
            c
        };

        if let Some(dir) = call.get_string("working_dir") {
            let path = Path::new(dir);
            if !path.exists() {
                return ToolResult::failure(
                    RUN_COMMAND,
                    ToolError::not_found(format!("Working directory does not exist: {}", dir)),
                );
            }
            if !path.is_dir() {
                return ToolResult::failure(
                    RUN_COMMAND,
                    ToolError::invalid_argument(format!("'{}' is not a directory", dir)),
                );
            }
            cmd.current_dir(path);
        }

        cmd.kill_on_drop(true);

        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            cmd.output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ToolResult::failure(
                    RUN_COMMAND,
                    ToolError::execution_failed(format!("Failed to spawn command: {}", e)),
                );
            }
            Err(_) => {
                return ToolResult::failure(
                    RUN_COMMAND,
                    ToolError::timeout(format!(
                        "Command timed out after {} seconds",
                        timeout_secs
                    )),
                );
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut combined = String::new();
        if !stdout.is_empty() {
            combined.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push_str("\n--- stderr ---\n");
            }
            combined.push_str(&stderr);
        }
        if combined.len() > MAX_OUTPUT_SIZE {
            combined.truncate(MAX_OUTPUT_SIZE);
            combined.push_str("\n... (output truncated)");
        }

        // Non-zero exit is still a tool-level success; the agent decides
        // what a failing command means.
        if output.status.success() {
            ToolResult::success(RUN_COMMAND, combined)
        } else {
            ToolResult::success(
                RUN_COMMAND,
                format!("Command exited with code {}\n{}", exit_code, combined),
            )
        }
    }
}
