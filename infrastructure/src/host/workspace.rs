//! Workspace file tools: read_file, write_file, list_dir

use async_trait::async_trait;
use conduit_domain::tool::entities::{ToolCall, ToolDefinition};
use conduit_domain::tool::value_objects::{ToolError, ToolResult};
use std::fs;
use std::path::Path;

use super::ToolHandler;

/// Tool name constants
pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const LIST_DIR: &str = "list_dir";

/// Maximum file size to read (10 MB)
const MAX_READ_SIZE: u64 = 10 * 1024 * 1024;

/// Read a file, with optional line offset/limit windowing.
pub struct ReadFileTool;

#[async_trait]
impl ToolHandler for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(READ_FILE, "Read the contents of a file at the specified path")
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file to read",
                    },
                    "offset": {
                        "type": "number",
                        "description": "Line number to start reading from (0-indexed)",
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of lines to read",
                    },
                },
                "required": ["path"],
            }))
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let path_str = match call.require_string("path") {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(READ_FILE, ToolError::invalid_argument(e)),
        };

        let path = Path::new(path_str);
        if !path.exists() {
            return ToolResult::failure(READ_FILE, ToolError::not_found(path_str));
        }
        if !path.is_file() {
            return ToolResult::failure(
                READ_FILE,
                ToolError::invalid_argument(format!("'{}' is not a file", path_str)),
            );
        }

        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                return ToolResult::failure(
                    READ_FILE,
                    ToolError::execution_failed(format!("Failed to get file metadata: {}", e)),
                );
            }
        };
        if metadata.len() > MAX_READ_SIZE {
            return ToolResult::failure(
                READ_FILE,
                ToolError::invalid_argument(format!(
                    "File too large ({} bytes). Maximum size is {} bytes",
                    metadata.len(),
                    MAX_READ_SIZE
                )),
            );
        }

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return ToolResult::failure(READ_FILE, ToolError::permission_denied(path_str));
                }
                return ToolResult::failure(
                    READ_FILE,
                    ToolError::execution_failed(format!("Failed to read file: {}", e)),
                );
            }
        };

        let offset = call.get_i64("offset").unwrap_or(0).max(0) as usize;
        let limit = call.get_i64("limit");

        let output = if offset > 0 || limit.is_some() {
            let lines: Vec<&str> = content.lines().collect();
            let end = match limit {
                Some(limit) => (offset + limit.max(0) as usize).min(lines.len()),
                None => lines.len(),
            };
            if offset >= lines.len() {
                String::new()
            } else {
                lines[offset..end].join("\n")
            }
        } else {
            content
        };

        ToolResult::success(READ_FILE, output)
    }
}

/// Write (or overwrite) a file.
pub struct WriteFileTool;

#[async_trait]
impl ToolHandler for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            WRITE_FILE,
            "Write content to a file at the specified path. Creates the file if it doesn't exist, or overwrites if it does.",
        )
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write",
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file",
                },
                "create_dirs": {
                    "type": "boolean",
                    "description": "Create parent directories if they don't exist",
                },
            },
            "required": ["path", "content"],
        }))
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let path_str = match call.require_string("path") {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(WRITE_FILE, ToolError::invalid_argument(e)),
        };
        let content = match call.require_string("content") {
            Ok(c) => c,
            Err(e) => return ToolResult::failure(WRITE_FILE, ToolError::invalid_argument(e)),
        };

        let path = Path::new(path_str);
        if call.get_bool("create_dirs").unwrap_or(false)
            && let Some(parent) = path.parent()
            && !parent.exists()
            && let Err(e) = fs::create_dir_all(parent)
        {
            return ToolResult::failure(
                WRITE_FILE,
                ToolError::execution_failed(format!("Failed to create directories: {}", e)),
            );
        }

        match fs::write(path, content) {
            Ok(()) => ToolResult::success(
                WRITE_FILE,
                format!("Wrote {} bytes to {}", content.len(), path_str),
            ),
            Err(e) => {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    ToolResult::failure(WRITE_FILE, ToolError::permission_denied(path_str))
                } else {
                    ToolResult::failure(
                        WRITE_FILE,
                        ToolError::execution_failed(format!("Failed to write file: {}", e)),
                    )
                }
            }
        }
    }
}

/// List a directory, directories marked with a trailing slash.
pub struct ListDirTool;

#[async_trait]
impl ToolHandler for ListDirTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(LIST_DIR, "List the entries of a directory").with_schema(
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path to list (default: .)",
                    },
                },
            }),
        )
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let path_str = call.get_string("path").unwrap_or(".");

        let path = Path::new(path_str);
        if !path.exists() {
            return ToolResult::failure(LIST_DIR, ToolError::not_found(path_str));
        }
        if !path.is_dir() {
            return ToolResult::failure(
                LIST_DIR,
                ToolError::invalid_argument(format!("'{}' is not a directory", path_str)),
            );
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                return ToolResult::failure(
                    LIST_DIR,
                    ToolError::execution_failed(format!("Failed to read directory: {}", e)),
                );
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| {
                let mut name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    name.push('/');
                }
                name
            })
            .collect();
        names.sort();

        ToolResult::success(LIST_DIR, names.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        fs::write(&path, "line one\nline two\nline three").unwrap();

        let call = ToolCall::new(READ_FILE).with_arg("path", path.to_str().unwrap());
        let result = ReadFileTool.execute(&call).await;

        assert!(result.is_success());
        assert!(result.output().unwrap().contains("line two"));
    }

    #[tokio::test]
    async fn test_read_file_offset_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        fs::write(&path, "a\nb\nc\nd").unwrap();

        let call = ToolCall::new(READ_FILE)
            .with_arg("path", path.to_str().unwrap())
            .with_arg("offset", 1)
            .with_arg("limit", 2);
        let result = ReadFileTool.execute(&call).await;

        assert_eq!(result.output(), Some("b\nc"));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let call = ToolCall::new(READ_FILE).with_arg("path", "/nonexistent/file.txt");
        let result = ReadFileTool.execute(&call).await;

        assert!(!result.is_success());
        assert_eq!(result.error().unwrap().code, "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_write_file_with_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/out.txt");

        let call = ToolCall::new(WRITE_FILE)
            .with_arg("path", path.to_str().unwrap())
            .with_arg("content", "written")
            .with_arg("create_dirs", true);
        let result = WriteFileTool.execute(&call).await;

        assert!(result.is_success());
        assert_eq!(fs::read_to_string(&path).unwrap(), "written");
    }

    #[tokio::test]
    async fn test_write_file_missing_content() {
        let call = ToolCall::new(WRITE_FILE).with_arg("path", "/tmp/whatever.txt");
        let result = WriteFileTool.execute(&call).await;

        assert!(!result.is_success());
        assert_eq!(result.error().unwrap().code, "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_list_dir_marks_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("file.txt"), "x").unwrap();

        let call = ToolCall::new(LIST_DIR).with_arg("path", dir.path().to_str().unwrap());
        let result = ListDirTool.execute(&call).await;

        assert!(result.is_success());
        let output = result.output().unwrap();
        assert!(output.contains("file.txt"));
        assert!(output.contains("sub/"));
    }
}
