//! Search tools: regex search over file contents and glob search over names.
//!
//! Walks respect `.gitignore` and skip hidden entries. Name globs are
//! compiled with `ignore`'s override matcher, so `*.py` matches at any depth.

use crate::{ToolContext, bool_arg, str_arg, usize_arg};
use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Upper bound on reported matches or found files.
pub const MAX_RESULTS: usize = 200;

fn walker(base: &Path, glob: &str, max_depth: Option<usize>) -> Result<ignore::Walk, String> {
    let mut builder = WalkBuilder::new(base);
    builder
        .hidden(true)
        .parents(false)
        .require_git(false)
        .max_depth(max_depth)
        .sort_by_file_name(|a, b| a.cmp(b));

    if !glob.is_empty() && glob != "*" {
        let overrides = OverrideBuilder::new(base)
            .add(glob)
            .and_then(|b| b.build())
            .map_err(|e| format!("Error: Invalid file pattern '{glob}': {e}"))?;
        builder.overrides(overrides);
    }
    Ok(builder.build())
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn join_error(tool_name: &str, e: tokio::task::JoinError) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool_name.into(),
        reason: e.to_string(),
    }
}

pub struct GrepFilesTool {
    ctx: ToolContext,
}

impl GrepFilesTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

struct GrepQuery {
    root: PathBuf,
    base: PathBuf,
    regex: Regex,
    file_pattern: String,
    line_numbers: bool,
}

impl GrepQuery {
    /// Returns the matching lines and whether the cap was hit.
    fn run(&self) -> Result<(Vec<String>, bool), String> {
        let mut matches = Vec::new();
        for entry in walker(&self.base, &self.file_pattern, None)?.flatten() {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            // Binary and non-UTF-8 files are skipped
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            let rel = relative(&self.root, entry.path());
            for (idx, line) in content.lines().enumerate() {
                if !self.regex.is_match(line) {
                    continue;
                }
                if matches.len() == MAX_RESULTS {
                    return Ok((matches, true));
                }
                matches.push(if self.line_numbers {
                    format!("{rel}:{}: {}", idx + 1, line.trim_end())
                } else {
                    format!("{rel}: {}", line.trim_end())
                });
            }
        }
        Ok((matches, false))
    }
}

#[async_trait]
impl Tool for GrepFilesTool {
    fn name(&self) -> &str {
        "grep_files"
    }

    fn description(&self) -> &str {
        "Search for text patterns (regular expressions) in files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Text or regex pattern to search for" },
                "file_pattern": { "type": "string", "description": "File glob such as '*.py' (default '*')" },
                "directory": { "type": "string", "description": "Directory to search in (default '.')" },
                "include_line_numbers": { "type": "boolean", "description": "Show line numbers (default true)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let pattern = arguments["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'pattern' argument".into()))?;
        let file_pattern = str_arg(&arguments, "file_pattern", "*").to_string();
        let directory = str_arg(&arguments, "directory", ".");
        let line_numbers = bool_arg(&arguments, "include_line_numbers", true);

        let base = self.ctx.resolve(self.name(), directory)?;
        if !base.exists() {
            return Ok(ToolResult::failure(format!(
                "Error: Directory '{directory}' does not exist"
            )));
        }

        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                return Ok(ToolResult::failure(format!(
                    "Error: Invalid search pattern '{pattern}': {e}"
                )));
            }
        };

        debug!(pattern, file_pattern = %file_pattern, directory, "Searching file contents");

        let query = GrepQuery {
            root: self.ctx.sandbox.root().to_path_buf(),
            base,
            regex,
            file_pattern: file_pattern.clone(),
            line_numbers,
        };
        let outcome = tokio::task::spawn_blocking(move || query.run())
            .await
            .map_err(|e| join_error("grep_files", e))?;

        let (matches, truncated) = match outcome {
            Ok(found) => found,
            Err(message) => return Ok(ToolResult::failure(message)),
        };

        if matches.is_empty() {
            return Ok(ToolResult::ok(format!(
                "No matches found for pattern '{pattern}' in {file_pattern} files"
            )));
        }

        let count = matches.len();
        let mut output = format!(
            "Search results for pattern '{pattern}' in {file_pattern} files:\n\n{}",
            matches.join("\n")
        );
        if truncated {
            output.push_str(&format!("\n... (truncated, showing first {MAX_RESULTS} matches)"));
        }
        Ok(ToolResult::ok(output).with_data(serde_json::json!({
            "matches": count,
            "truncated": truncated,
        })))
    }
}

pub struct FindFilesTool {
    ctx: ToolContext,
}

impl FindFilesTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for FindFilesTool {
    fn name(&self) -> &str {
        "find_files"
    }

    fn description(&self) -> &str {
        "Find files by name pattern, e.g. '*.py', '*test*', 'config.*'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name_pattern": { "type": "string", "description": "File name glob" },
                "directory": { "type": "string", "description": "Directory to search in (default '.')" },
                "max_depth": { "type": "integer", "description": "Maximum depth to search (default 5)" }
            },
            "required": ["name_pattern"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let name_pattern = arguments["name_pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'name_pattern' argument".into()))?
            .to_string();
        let directory = str_arg(&arguments, "directory", ".");
        let max_depth = usize_arg(&arguments, "max_depth", 5);

        let base = self.ctx.resolve(self.name(), directory)?;
        if !base.exists() {
            return Ok(ToolResult::failure(format!(
                "Error: Directory '{directory}' does not exist"
            )));
        }

        debug!(name_pattern = %name_pattern, directory, max_depth, "Finding files");

        let root = self.ctx.sandbox.root().to_path_buf();
        let glob = name_pattern.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<Vec<String>, String> {
            Ok(walker(&base, &glob, Some(max_depth))?
                .flatten()
                .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
                .map(|e| relative(&root, e.path()))
                .collect())
        })
        .await
        .map_err(|e| join_error("find_files", e))?;

        let mut found = match outcome {
            Ok(found) => found,
            Err(message) => return Ok(ToolResult::failure(message)),
        };

        if found.is_empty() {
            return Ok(ToolResult::ok(format!(
                "No files found matching pattern '{name_pattern}'"
            )));
        }

        let truncated = found.len() > MAX_RESULTS;
        found.truncate(MAX_RESULTS);
        let mut output = format!(
            "Found {} files matching pattern '{name_pattern}':\n\n{}",
            found.len(),
            found.join("\n")
        );
        if truncated {
            output.push_str(&format!("\n... (truncated, showing first {MAX_RESULTS} results)"));
        }
        Ok(ToolResult::ok(output).with_data(serde_json::json!({ "files": found })))
    }
}
