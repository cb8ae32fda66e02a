//! Prompt assembly.
//!
//! The prompt is a system message with the protocol instructions and a
//! single user message made of fixed sections:
//!
//! | Section | Contents | When |
//! |---------|----------|------|
//! | `FILE SYSTEM CONTEXT` | Explored directory tree | always |
//! | `CODE CONTEXT` | Context store render, fitted to the budget | always |
//! | `TASK PROMPT` | The delegated task | sub-agent only |
//! | `ACTION HISTORY` | One status line per recent action, oldest dropped first | always |
//! | `PREVIOUS ACTION RESULT` | Detail of the latest result | always |
//! | `CONVERSATION HISTORY` | User/assistant messages, oldest dropped first | always |
//! | `SUB-AGENT RESULTS` | What the sub-agent handed back | main agent, when present |

use codeloop_core::action::{ActionProtocol, ActionResult, ActionRole, ActionStatus, format_params};
use codeloop_core::agent::AgentRole;
use codeloop_core::message::{Message, Role};
use codeloop_core::tool::ToolDefinition;
use codeloop_tools::file_write::split_path_content;
use std::fmt::Write as _;

use crate::context::token::prompt_byte_budget;
use crate::state::TurnState;

/// Longest latest-result output repeated verbatim in the prompt, in characters.
const MAX_RESULT_DETAIL_CHARS: usize = 4000;

/// Most recent actions listed in `ACTION HISTORY`.
const MAX_ACTION_HISTORY_LINES: usize = 50;

/// An assembled prompt ready for the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub system: String,
    pub body: String,
}

impl AssembledPrompt {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(self.system.clone()), Message::user(self.body.clone())]
    }

    /// The whole prompt as one text, for diagnostics.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.system, self.body)
    }

    pub fn len(&self) -> usize {
        self.system.len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.body.is_empty()
    }
}

pub struct PromptBuilder {
    protocol: ActionProtocol,
    tools: Vec<ToolDefinition>,
    system_override: Option<String>,
    context_window: u32,
    reserved_for_reply: u32,
}

impl PromptBuilder {
    pub fn new(protocol: ActionProtocol, tools: Vec<ToolDefinition>) -> Self {
        Self {
            protocol,
            tools,
            system_override: None,
            context_window: 32_768,
            reserved_for_reply: 4_096,
        }
    }

    /// Replace the main agent's system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_override = Some(prompt.into());
        self
    }

    /// Context window in tokens, and tokens kept free for the reply.
    pub fn with_budget(mut self, context_window: u32, reserved_for_reply: u32) -> Self {
        self.context_window = context_window;
        self.reserved_for_reply = reserved_for_reply;
        self
    }

    pub fn byte_budget(&self) -> usize {
        prompt_byte_budget(self.context_window, self.reserved_for_reply)
    }

    pub fn system_prompt(&self, agent: AgentRole) -> String {
        match (&self.system_override, agent) {
            (Some(prompt), AgentRole::Main) => prompt.clone(),
            _ => default_system_prompt(&self.protocol, &self.tools, agent),
        }
    }

    pub fn build(&self, state: &TurnState) -> AssembledPrompt {
        let agent = state.current_agent();
        let system = self.system_prompt(agent);

        let mut before_code = String::new();
        section(&mut before_code, "FILE SYSTEM CONTEXT", &state.exploration.render());

        let mut after_code = String::new();
        if agent == AgentRole::Sub
            && let Some(task) = state.task_str("subagent_prompt")
        {
            section(&mut after_code, "TASK PROMPT", task);
        }
        // At most a quarter of the budget, so code context keeps priority.
        let actions = action_history(state.actions(), self.byte_budget() / 4);
        section(&mut after_code, "ACTION HISTORY", &actions);
        section(&mut after_code, "PREVIOUS ACTION RESULT", &latest_result(state.latest_action_result()));

        let mut trailer = String::new();
        if agent == AgentRole::Main
            && let Some(result) = state.task_str("sub_result")
        {
            section(&mut trailer, "SUB-AGENT RESULTS", result);
        }

        let fixed = system.len() + before_code.len() + after_code.len() + trailer.len();
        let available = self.byte_budget().saturating_sub(fixed);
        let full_history = conversation_history(state.messages(), usize::MAX);
        let code_budget = available
            .saturating_sub(full_history.len())
            .max(available / 2);
        let code = state.context.render_bounded(code_budget);
        let history_budget = available.saturating_sub(code.len());
        let history = if full_history.len() <= history_budget {
            full_history
        } else {
            conversation_history(state.messages(), history_budget)
        };

        let mut body = before_code;
        section(&mut body, "CODE CONTEXT", &code);
        body.push_str(&after_code);
        section(&mut body, "CONVERSATION HISTORY", &history);
        body.push_str(&trailer);

        AssembledPrompt {
            system,
            body: body.trim_end().to_string(),
        }
    }
}

fn section(out: &mut String, title: &str, content: &str) {
    let _ = write!(out, "=== {title} ===\n{}\n\n", content.trim_end());
}

/// One status line per recorded action, newest kept first within
/// `max_bytes` and [`MAX_ACTION_HISTORY_LINES`]. Numbering follows the full
/// history.
fn action_history(actions: &[ActionResult], max_bytes: usize) -> String {
    if actions.is_empty() {
        return "No actions taken yet.".into();
    }

    let mut kept = Vec::new();
    let mut used = 0;
    for (i, result) in actions.iter().enumerate().rev() {
        let line = format!("Action {}: {} - {}", i + 1, describe_result(result), result.status.label());
        let cost = line.len() + 1;
        if kept.len() == MAX_ACTION_HISTORY_LINES || (!kept.is_empty() && used + cost > max_bytes) {
            break;
        }
        used += cost;
        kept.push(line);
    }
    let dropped = actions.len() - kept.len();
    kept.reverse();

    let mut out = String::new();
    if dropped > 0 {
        let _ = writeln!(out, "[{dropped} earlier action(s) omitted]");
    }
    out.push_str(&kept.join("\n"));
    out
}

fn latest_result(latest: Option<&ActionResult>) -> String {
    let Some(result) = latest else {
        return "No previous action.".into();
    };
    let description = describe_result(result);

    if result.status != ActionStatus::Succeeded {
        let output = truncate(&result.output_text(), MAX_RESULT_DETAIL_CHARS);
        return format!("✗ Latest action: {description} - {}\n{output}", result.status.label());
    }

    let detail = match result.action.as_str() {
        "read_file" => "The file content is shown in the CODE CONTEXT section above.".to_string(),
        "write_file" | "update_file" => {
            "The new file content is shown in the CODE CONTEXT section above.".to_string()
        }
        "list_files" => {
            "The directory structure is shown in the FILE SYSTEM CONTEXT section above.".to_string()
        }
        _ if result.role.is_control() => result.output_text().into_owned(),
        _ => truncate(&result.output_text(), MAX_RESULT_DETAIL_CHARS),
    };
    format!("✓ Latest action: {description} - SUCCESS\n{detail}")
}

/// Human description of what an action did, used in history lines.
pub fn describe_result(result: &ActionResult) -> String {
    let param = |key: &str| result.param_str(key).unwrap_or_default().to_string();
    match result.role {
        ActionRole::Announce => return format!("Told the user '{}'", truncate(&param("message"), 80)),
        ActionRole::Terminal => return "Ended the turn".into(),
        ActionRole::InvokeAgent => return format!("Invoked sub-agent: {}", truncate(&param("prompt"), 80)),
        ActionRole::ReturnToMain => return "Returned result to the main agent".into(),
        ActionRole::Tool => {}
    }

    match result.action.as_str() {
        "read_file" => format!("Read file '{}'", param("file_path")),
        "write_file" => {
            let path = result
                .extra_str("file_path")
                .map(str::to_string)
                .or_else(|| result.param_str("file_path_content").map(|raw| split_path_content(raw).0))
                .unwrap_or_else(|| param("file_path"));
            format!("Wrote file '{path}'")
        }
        "update_file" => format!("Updated file '{}'", param("file_path")),
        "list_files" => format!(
            "Listed files in '{}'",
            result.param_str("directory").unwrap_or(".")
        ),
        "grep_files" => format!("Searched for '{}'", param("pattern")),
        "find_files" => format!("Found files matching '{}'", param("name_pattern")),
        "execute_command" => format!("Ran command '{}'", param("command")),
        name => format!("{name}({})", format_params(&result.parameters)),
    }
}

/// `USER:`/`ASSISTANT:` lines within `max_bytes`, dropping the oldest
/// messages first but always keeping the newest one.
fn conversation_history(messages: &[Message], max_bytes: usize) -> String {
    if messages.is_empty() {
        return "No messages yet.".into();
    }
    let lines: Vec<String> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
        .collect();

    let mut kept = Vec::new();
    let mut used = 0;
    for line in lines.iter().rev() {
        let cost = line.len() + 1;
        if !kept.is_empty() && used + cost > max_bytes {
            break;
        }
        used += cost;
        kept.push(line.as_str());
    }
    let dropped = lines.len() - kept.len();
    kept.reverse();

    let mut out = String::new();
    if dropped > 0 {
        let _ = writeln!(out, "[{dropped} earlier message(s) omitted]");
    }
    out.push_str(&kept.join("\n"));
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    crate::context::summarizer::truncate_chars(text, max_chars)
}

/// Protocol instructions for `agent`, listing the control actions and tools.
pub fn default_system_prompt(protocol: &ActionProtocol, tools: &[ToolDefinition], agent: AgentRole) -> String {
    let mut out = String::new();
    match agent {
        AgentRole::Main => out.push_str(
            "You are a coding assistant working inside the user's project directory. \
             You act by emitting actions; the results of your actions are shown to you \
             in the next prompt.\n\n",
        ),
        AgentRole::Sub => out.push_str(
            "You are a sub-agent helping a main coding assistant with one focused task, \
             given in the TASK PROMPT section. You share the main agent's view of the \
             project files but not its conversation.\n\n",
        ),
    }

    out.push_str("Reply with a single JSON object and nothing else:\n");
    out.push_str("```json\n{\"actions\": [{\"action\": \"<name>\", \"parameters\": {...}}, ...]}\n```\n\n");

    out.push_str("Rules:\n");
    let _ = writeln!(
        out,
        "- The first action must be \"{}\" with a \"message\" telling the user what you are doing.",
        protocol.announce
    );
    out.push_str("- Actions run in order; later actions see the effects of earlier ones.\n");
    match agent {
        AgentRole::Main => {
            let _ = writeln!(
                out,
                "- When the task is done, or you need the user's input, end with \"{}\" and a \"message\".",
                protocol.terminal
            );
            let _ = writeln!(
                out,
                "- To delegate a focused analysis, use \"{}\" with \"agent_type\": \"sub_agent\" and a \"prompt\".",
                protocol.invoke_agent
            );
        }
        AgentRole::Sub => {
            let _ = writeln!(
                out,
                "- When your task is done, use \"{}\" with a \"response\" for the main agent.",
                protocol.return_to_main
            );
        }
    }
    out.push_str("- If an action fails, read the error in the next prompt and adjust.\n\n");

    out.push_str("Tools:\n");
    for tool in tools {
        let params = tool.parameters["properties"]
            .as_object()
            .map(|props| props.keys().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        let _ = writeln!(out, "- {}({params}): {}", tool.name, tool.description);
    }
    out.trim_end().to_string()
}
