//! Built-in tool implementations for codeloop.
//!
//! Tools give the agent its hands inside the project directory: list and
//! read files, write and patch them, search by content or name, and run
//! shell commands. Every path is resolved through a [`ProjectSandbox`];
//! writes and commands go through the [`PermissionManager`].

pub mod file_list;
pub mod file_read;
pub mod file_write;
pub mod search;
pub mod shell;

use codeloop_core::error::ToolError;
use codeloop_core::tool::ToolRegistry;
use codeloop_security::{PermissionManager, ProjectSandbox};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for `execute_command`.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the built-in tools share.
#[derive(Clone)]
pub struct ToolContext {
    pub sandbox: Arc<ProjectSandbox>,
    pub permissions: Arc<PermissionManager>,
    /// If non-empty, `execute_command` only runs these base commands.
    pub allowed_commands: Vec<String>,
    pub command_timeout: Duration,
}

impl ToolContext {
    pub fn new(sandbox: Arc<ProjectSandbox>, permissions: Arc<PermissionManager>) -> Self {
        Self {
            sandbox,
            permissions,
            allowed_commands: Vec::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_allowed_commands(mut self, commands: Vec<String>) -> Self {
        self.allowed_commands = commands;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Resolve a model-supplied path, mapping sandbox violations to a tool error.
    pub(crate) fn resolve(&self, tool_name: &str, path: &str) -> Result<PathBuf, ToolError> {
        self.sandbox
            .resolve(path)
            .map_err(|e| ToolError::PermissionDenied {
                tool_name: tool_name.into(),
                reason: e.to_string(),
            })
    }
}

/// Create the registry of built-in tools.
pub fn default_registry(ctx: ToolContext) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(file_list::ListFilesTool::new(ctx.clone())));
    registry.register(Box::new(file_read::ReadFileTool::new(ctx.clone())));
    registry.register(Box::new(file_write::WriteFileTool::new(ctx.clone())));
    registry.register(Box::new(file_write::UpdateFileTool::new(ctx.clone())));
    registry.register(Box::new(search::GrepFilesTool::new(ctx.clone())));
    registry.register(Box::new(search::FindFilesTool::new(ctx.clone())));
    registry.register(Box::new(shell::ExecuteCommandTool::new(ctx)));
    registry
}

/// "<n> bytes" under 1 KiB, "<x.y> KB" otherwise.
pub(crate) fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}

/// Read a string argument, defaulting when absent.
pub(crate) fn str_arg<'a>(arguments: &'a serde_json::Value, key: &str, default: &'a str) -> &'a str {
    arguments[key].as_str().unwrap_or(default)
}

/// Read a bool argument that models sometimes send as a string.
pub(crate) fn bool_arg(arguments: &serde_json::Value, key: &str, default: bool) -> bool {
    match &arguments[key] {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => default,
    }
}

/// Read an integer argument that models sometimes send as a string.
pub(crate) fn usize_arg(arguments: &serde_json::Value, key: &str, default: usize) -> usize {
    match &arguments[key] {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize).unwrap_or(default),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}
