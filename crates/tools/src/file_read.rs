//! Read file tool: returns file contents under a `File:` header.

use crate::{ToolContext, format_size};
use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use tracing::debug;

pub struct ReadFileTool {
    ctx: ToolContext,
}

impl ReadFileTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    async fn read_one(&self, file_path: &str) -> Result<Result<(String, String), String>, ToolError> {
        let full_path = self.ctx.resolve(self.name(), file_path)?;

        if !full_path.exists() {
            return Ok(Err(format!("Error: File '{file_path}' does not exist")));
        }
        if !full_path.is_file() {
            return Ok(Err(format!("Error: '{file_path}' is not a file")));
        }

        let bytes = match tokio::fs::read(&full_path).await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Err(format!("Error reading file '{file_path}': {e}"))),
        };
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let header = format!("File: {file_path} ({})", format_size(bytes.len() as u64));
        let rule = "=".repeat(header.chars().count());

        Ok(Ok((content.clone(), format!("{header}\n{rule}\n\n{content}"))))
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Use this to view code. Separate several paths with commas."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path relative to the project root, or several comma-separated paths"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let raw = arguments["file_path"]
            .as_str()
            .or_else(|| arguments["path"].as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_path' argument".into()))?;

        let paths: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if paths.is_empty() {
            return Err(ToolError::InvalidArguments("Empty 'file_path' argument".into()));
        }

        let mut sections = Vec::new();
        let mut errors = Vec::new();
        let mut files = Vec::new();

        for path in paths {
            debug!(path, "Reading file");
            match self.read_one(path).await? {
                Ok((content, section)) => {
                    sections.push(section);
                    files.push(serde_json::json!({ "path": path, "content": content }));
                }
                Err(message) => errors.push(message),
            }
        }

        let success = !files.is_empty();
        sections.extend(errors);
        let result = ToolResult {
            success,
            output: sections.join("\n\n"),
            data: None,
        };
        Ok(if success {
            result.with_data(serde_json::json!({ "files": files }))
        } else {
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;

    #[test]
    fn tool_definition() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(context(dir.path()));
        assert_eq!(tool.name(), "read_file");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["file_path"]));
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.txt"), "Hello, world!\n").unwrap();

        let tool = ReadFileTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"file_path": "test.txt"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.starts_with("File: test.txt (14 bytes)\n====="));
        assert!(result.output.ends_with("Hello, world!\n"));
        let data = result.data.unwrap();
        assert_eq!(data["files"][0]["path"], "test.txt");
        assert_eq!(data["files"][0]["content"], "Hello, world!\n");
    }

    #[tokio::test]
    async fn read_several_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "a = 1\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "b = 2\n").unwrap();

        let tool = ReadFileTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"file_path": "a.py, b.py, missing.py"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.starts_with("File: a.py"));
        assert!(result.output.contains("File: b.py"));
        assert!(result.output.contains("Error: File 'missing.py' does not exist"));
        assert_eq!(result.data.unwrap()["files"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn read_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"file_path": "nope.txt"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "Error: File 'nope.txt' does not exist");
        assert!(result.data.is_none());
    }

    #[tokio::test]
    async fn read_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let tool = ReadFileTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"file_path": "src"}))
            .await
            .unwrap();
        assert_eq!(result.output, "Error: 'src' is not a file");
    }

    #[tokio::test]
    async fn missing_argument() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(context(dir.path()));
        let result = tool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn blocked_outside_project() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"file_path": "/etc/passwd"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
