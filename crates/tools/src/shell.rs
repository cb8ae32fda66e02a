//! Execute command tool: run a shell command in the project root.
//!
//! Supports command allowlisting, permission prompts, and a timeout. The
//! child is killed when the timeout fires or the future is dropped.

use crate::ToolContext;
use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use codeloop_security::Operation;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct ExecuteCommandTool {
    ctx: ToolContext,
}

impl ExecuteCommandTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.ctx.allowed_commands.is_empty() {
            return true;
        }
        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();
        self.ctx.allowed_commands.iter().any(|a| a == base_cmd)
    }

    fn command(&self, command: &str) -> Command {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(self.ctx.sandbox.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// `Command:`/`Exit Code:` header followed by whichever streams produced output.
fn format_output(command: &str, code: i32, stdout: &str, stderr: &str) -> String {
    let mut lines = vec![format!("Command: {command}"), format!("Exit Code: {code}")];
    if !stdout.is_empty() {
        lines.push("\nStandard Output:".into());
        lines.push(stdout.to_string());
    }
    if !stderr.is_empty() {
        lines.push("\nStandard Error:".into());
        lines.push(stderr.to_string());
    }
    lines.join("\n")
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the project directory (requires permission)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .map(str::trim)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        if command.is_empty() {
            return Err(ToolError::InvalidArguments("Empty 'command' argument".into()));
        }

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "execute_command".into(),
                reason: format!(
                    "Command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        if !self.ctx.permissions.check(Operation::ExecuteCommand, command) {
            return Ok(ToolResult::failure(
                "Permission denied: Cannot execute command",
            ));
        }

        debug!(command = %command, "Executing shell command");

        let child = self
            .command(command)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "execute_command".into(),
                reason: e.to_string(),
            })?;

        let output =
            match tokio::time::timeout(self.ctx.command_timeout, child.wait_with_output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return Err(ToolError::ExecutionFailed {
                        tool_name: "execute_command".into(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(command = %command, "Command timed out");
                    return Err(ToolError::Timeout {
                        tool_name: "execute_command".into(),
                        timeout_secs: self.ctx.command_timeout.as_secs(),
                    });
                }
            };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code().unwrap_or(-1);
        if code != 0 {
            warn!(command = %command, exit_code = code, "Command exited non-zero");
        }

        // A non-zero exit is still a completed command; the model reads the code.
        Ok(ToolResult::ok(format_output(command, code, &stdout, &stderr)).with_data(
            serde_json::json!({ "command": command, "exit_code": code }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, read_only_context};
    use std::time::Duration;

    #[test]
    fn allowlist_check() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecuteCommandTool::new(
            context(dir.path()).with_allowed_commands(vec!["ls".into(), "git".into()]),
        );
        assert!(tool.is_command_allowed("ls -la"));
        assert!(tool.is_command_allowed("git status"));
        assert!(!tool.is_command_allowed("rm -rf /"));
    }

    #[test]
    fn empty_allowlist_allows_all() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecuteCommandTool::new(context(dir.path()));
        assert!(tool.is_command_allowed("anything goes"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_echo_in_project_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let tool = ExecuteCommandTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"command": "echo hello && ls"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("Command: echo hello && ls\nExit Code: 0"));
        assert!(result.output.contains("Standard Output:\nhello"));
        assert!(result.output.contains("marker.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_reports_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecuteCommandTool::new(context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert!(result.output.contains("Exit Code: 3"));
        assert!(result.output.contains("Standard Error:\noops"));
        assert_eq!(result.data.unwrap()["exit_code"], 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_command() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecuteCommandTool::new(
            context(dir.path()).with_command_timeout(Duration::from_millis(200)),
        );
        let err = tool
            .execute(serde_json::json!({"command": "sleep 5"}))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn blocked_command() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecuteCommandTool::new(
            context(dir.path()).with_allowed_commands(vec!["ls".into()]),
        );
        let result = tool
            .execute(serde_json::json!({"command": "rm -rf /"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn denied_in_read_only_mode() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecuteCommandTool::new(read_only_context(dir.path()));
        let result = tool
            .execute(serde_json::json!({"command": "echo hi"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "Permission denied: Cannot execute command");
    }
}
