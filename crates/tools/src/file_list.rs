//! List files tool: shows the project's directory structure.

use crate::{ToolContext, bool_arg, format_size, str_arg, usize_arg};
use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use ignore::WalkBuilder;
use std::path::Path;
use tracing::debug;

pub struct ListFilesTool {
    ctx: ToolContext,
}

impl ListFilesTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in a directory. Use this to explore the project structure."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "Directory to list, relative to the project root (default '.')"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Include subdirectories (default false)"
                },
                "max_depth": {
                    "type": "integer",
                    "description": "Maximum depth when recursive (default 3)"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let directory = str_arg(&arguments, "directory", ".").trim().to_string();
        let directory = if directory.is_empty() { ".".to_string() } else { directory };
        let recursive = bool_arg(&arguments, "recursive", false);
        let max_depth = usize_arg(&arguments, "max_depth", 3);

        let dir_path = self.ctx.resolve(self.name(), &directory)?;

        if !dir_path.exists() {
            return Ok(ToolResult::failure(format!(
                "Error: Directory '{directory}' does not exist"
            )));
        }
        if !dir_path.is_dir() {
            return Ok(ToolResult::failure(format!(
                "Error: '{directory}' is not a directory"
            )));
        }

        debug!(directory = %directory, recursive, max_depth, "Listing files");

        let root = self.ctx.sandbox.root().to_path_buf();
        let depth = if recursive { max_depth + 1 } else { 1 };
        let listing = tokio::task::spawn_blocking(move || collect(&root, &dir_path, depth))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "list_files".into(),
                reason: e.to_string(),
            })?;

        let mut lines = vec![format!("Directory: {directory}")];
        lines.push(format!("\nDirectories ({}):", listing.directories.len()));
        lines.extend(listing.directories.iter().cloned());
        lines.push(format!("\nFiles ({}):", listing.files.len()));
        lines.extend(listing.files.iter().cloned());

        Ok(ToolResult::ok(lines.join("\n")).with_data(serde_json::json!({
            "directory": directory,
            "directories": listing.directories.len(),
            "files": listing.files.len(),
        })))
    }
}

#[derive(Default)]
struct Listing {
    directories: Vec<String>,
    files: Vec<String>,
}

/// Walk `dir` up to `max_depth` levels, skipping hidden and gitignored entries.
fn collect(root: &Path, dir: &Path, max_depth: usize) -> Listing {
    let mut listing = Listing::default();
    let walker = WalkBuilder::new(dir)
        .max_depth(Some(max_depth))
        .hidden(true)
        .parents(false)
        .require_git(false)
        .sort_by_file_name(|a, b| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                listing.files.push(format!("Error accessing entry: {e}"));
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let indent = "  ".repeat(entry.depth() - 1);
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        if entry.file_type().is_some_and(|t| t.is_dir()) {
            listing.directories.push(format!("{indent}📁 {rel}/"));
        } else {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            listing
                .files
                .push(format!("{indent}📄 {rel} ({})", format_size(size)));
        }
    }
    listing
}
