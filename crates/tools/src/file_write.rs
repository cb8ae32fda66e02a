//! Write and update tools: create files and patch them in place.
//!
//! Both ask the [`PermissionManager`](codeloop_security::PermissionManager)
//! before touching the disk and return the new file content as structured
//! data so the agent can keep its context in sync.

use crate::ToolContext;
use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use codeloop_security::Operation;
use std::path::Path;
use tracing::{debug, info};

/// Split the `path|content` form. Without a pipe the first line is the path
/// and the rest is content; a single line is a path with empty content.
pub fn split_path_content(raw: &str) -> (String, String) {
    if let Some((path, content)) = raw.split_once('|') {
        return (path.trim().to_string(), content.to_string());
    }
    if !raw.starts_with('/')
        && let Some((path, content)) = raw.split_once('\n')
    {
        return (path.trim().to_string(), content.to_string());
    }
    (raw.trim().to_string(), String::new())
}

async fn write_to_disk(full_path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = full_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("Error creating directory: {e}"))?;
    }
    tokio::fs::write(full_path, content)
        .await
        .map_err(|e| format!("Error writing file: {e}"))
}

pub struct WriteFileTool {
    ctx: ToolContext,
}

impl WriteFileTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file (requires permission). Format: 'file_path|content'"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path_content": {
                    "type": "string",
                    "description": "The path and the full new content separated by '|'"
                }
            },
            "required": ["file_path_content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let (file_path, content) = match (
            arguments["file_path_content"].as_str(),
            arguments["file_path"].as_str(),
        ) {
            (Some(raw), _) => split_path_content(raw),
            (None, Some(path)) => (
                path.trim().to_string(),
                arguments["content"].as_str().unwrap_or_default().to_string(),
            ),
            (None, None) => {
                return Err(ToolError::InvalidArguments(
                    "Missing 'file_path_content' argument".into(),
                ));
            }
        };

        if file_path.is_empty() {
            return Err(ToolError::InvalidArguments("Empty file path".into()));
        }

        let full_path = self.ctx.resolve(self.name(), &file_path)?;

        if !self.ctx.permissions.check(Operation::WriteFile, &file_path) {
            return Ok(ToolResult::failure(format!(
                "Permission denied: Cannot write to file '{file_path}'"
            )));
        }

        debug!(path = %file_path, bytes = content.len(), "Writing file");
        if let Err(message) = write_to_disk(&full_path, &content).await {
            return Ok(ToolResult::failure(message));
        }
        info!(path = %file_path, "File written");

        Ok(ToolResult::ok(format!("Successfully wrote to {file_path}")).with_data(
            serde_json::json!({ "file_path": file_path, "content": content }),
        ))
    }
}

pub struct UpdateFileTool {
    ctx: ToolContext,
}

impl UpdateFileTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for UpdateFileTool {
    fn name(&self) -> &str {
        "update_file"
    }

    fn description(&self) -> &str {
        "Replace the first exact occurrence of old_text with new_text in a file (requires permission)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "File to update" },
                "old_text": { "type": "string", "description": "Exact text to replace" },
                "new_text": { "type": "string", "description": "Replacement text" }
            },
            "required": ["file_path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let file_path = arguments["file_path"]
            .as_str()
            .map(str::trim)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_path' argument".into()))?;
        let old_text = arguments["old_text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'old_text' argument".into()))?;
        let new_text = arguments["new_text"].as_str().unwrap_or_default();

        if old_text.is_empty() {
            return Err(ToolError::InvalidArguments("'old_text' must not be empty".into()));
        }

        let full_path = self.ctx.resolve(self.name(), file_path)?;
        if !full_path.is_file() {
            return Ok(ToolResult::failure(format!(
                "Error: File '{file_path}' does not exist"
            )));
        }

        let original = match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => content,
            Err(e) => return Ok(ToolResult::failure(format!("Error reading file: {e}"))),
        };
        if !original.contains(old_text) {
            return Ok(ToolResult::failure(format!(
                "Error: Text to replace not found in '{file_path}'"
            )));
        }

        if !self.ctx.permissions.check(Operation::WriteFile, file_path) {
            return Ok(ToolResult::failure(format!(
                "Permission denied: Cannot write to file '{file_path}'"
            )));
        }

        let updated = original.replacen(old_text, new_text, 1);
        if let Err(message) = write_to_disk(&full_path, &updated).await {
            return Ok(ToolResult::failure(message));
        }
        info!(path = %file_path, "File updated");

        Ok(ToolResult::ok(format!("Successfully updated {file_path}")).with_data(
            serde_json::json!({ "file_path": file_path, "content": updated }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, read_only_context};

    #[test]
    fn split_forms() {
        assert_eq!(
            split_path_content("a.txt|hello|world"),
            ("a.txt".into(), "hello|world".into())
        );
        assert_eq!(
            split_path_content("src/a.py\nprint(1)\n"),
            ("src/a.py".into(), "print(1)\n".into())
        );
        assert_eq!(split_path_content(" empty.txt "), ("empty.txt".into(), String::new()));
    }

    #[tokio::test]
    async fn write_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"file_path_content": "output.txt|Hello from test!"}))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "Successfully wrote to output.txt");
        assert_eq!(result.data.unwrap()["content"], "Hello from test!");
        let content = std::fs::read_to_string(dir.path().join("output.txt")).unwrap();
        assert_eq!(content, "Hello from test!");
    }

    #[tokio::test]
    async fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"file_path": "a/b/c.txt", "content": "nested"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a/b/c.txt")).unwrap(),
            "nested"
        );
    }

    #[tokio::test]
    async fn write_denied_in_read_only_mode() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(read_only_context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"file_path_content": "x.txt|data"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "Permission denied: Cannot write to file 'x.txt'");
        assert!(!dir.path().join("x.txt").exists());
    }

    #[tokio::test]
    async fn write_outside_project_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"file_path_content": "../escape.txt|x"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn update_replaces_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.py"), "x = 1\nx = 1\n").unwrap();
        let tool = UpdateFileTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({
                "file_path": "lib.py",
                "old_text": "x = 1",
                "new_text": "x = 2"
            }))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.data.unwrap()["content"], "x = 2\nx = 1\n");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("lib.py")).unwrap(),
            "x = 2\nx = 1\n"
        );
    }

    #[tokio::test]
    async fn update_reports_missing_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.py"), "x = 1\n").unwrap();
        let tool = UpdateFileTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({
                "file_path": "lib.py",
                "old_text": "y = 1",
                "new_text": "y = 2"
            }))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "Error: Text to replace not found in 'lib.py'");
    }
}
