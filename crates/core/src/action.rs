//! Action protocol types.
//!
//! The model answers every prompt with a batch of actions. Each action is
//! either a control action (announce, terminal, delegation) handled by the
//! dispatcher itself, or a tool action resolved through the tool registry.
//! The literal action names are configuration; the dispatcher only cares
//! about the [`ActionRole`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

use crate::agent::AgentRole;

/// Ordered parameter map, preserving the key order the model emitted.
pub type Parameters = serde_json::Map<String, Value>;

/// One model-requested operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub parameters: Parameters,
    /// The parameters as they appeared before normalization.
    pub raw_parameters: Parameters,
}

impl Action {
    pub fn new(name: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            name: name.into(),
            raw_parameters: parameters.clone(),
            parameters,
        }
    }

    /// Build an action from a `json!({...})` object literal. Non-objects yield no parameters.
    pub fn from_json(name: impl Into<String>, parameters: Value) -> Self {
        match parameters {
            Value::Object(map) => Self::new(name, map),
            _ => Self::new(name, Parameters::new()),
        }
    }

    pub fn with_raw_parameters(mut self, raw: Parameters) -> Self {
        self.raw_parameters = raw;
        self
    }

    /// A string parameter, if present and a string.
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// The protocol role this action plays.
    pub fn role(&self, protocol: &ActionProtocol) -> ActionRole {
        protocol.role_of(&self.name)
    }

    /// Parameters rendered as `k=v, ...` for logs and summaries.
    pub fn params_inline(&self) -> String {
        format_params(&self.parameters)
    }
}

/// Render a parameter map as `k=v, k2=v2`, strings unquoted.
pub fn format_params(parameters: &Parameters) -> String {
    parameters
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// The part an action plays in the turn protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRole {
    /// User-visible narration; every batch starts with one.
    Announce,
    /// Ends the turn and hands control back to the user.
    Terminal,
    /// Delegates to a sub-agent.
    InvokeAgent,
    /// A sub-agent hands its result back to the main agent.
    ReturnToMain,
    /// Anything resolved through the tool registry.
    Tool,
}

impl ActionRole {
    pub fn is_control(&self) -> bool {
        !matches!(self, ActionRole::Tool)
    }
}

/// The configured action name for each control role.
///
/// Exactly one name per role: in particular exactly one terminal action,
/// so there is never ambiguity about where a turn ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionProtocol {
    pub announce: String,
    pub terminal: String,
    pub invoke_agent: String,
    pub return_to_main: String,
}

impl Default for ActionProtocol {
    fn default() -> Self {
        Self {
            announce: "respond".into(),
            terminal: "request_feedback".into(),
            invoke_agent: "invoke_agent".into(),
            return_to_main: "respond_to_master".into(),
        }
    }
}

impl ActionProtocol {
    pub fn role_of(&self, name: &str) -> ActionRole {
        if name == self.announce {
            ActionRole::Announce
        } else if name == self.terminal {
            ActionRole::Terminal
        } else if name == self.invoke_agent {
            ActionRole::InvokeAgent
        } else if name == self.return_to_main {
            ActionRole::ReturnToMain
        } else {
            ActionRole::Tool
        }
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        name == self.terminal
    }

    /// Names must be non-empty and distinct.
    pub fn validate(&self) -> Result<(), String> {
        let names = [
            &self.announce,
            &self.terminal,
            &self.invoke_agent,
            &self.return_to_main,
        ];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err("protocol action names must not be empty".into());
        }
        for (i, a) in names.iter().enumerate() {
            if names[i + 1..].contains(a) {
                return Err(format!("protocol action name '{a}' is used for more than one role"));
            }
        }
        Ok(())
    }

    /// Resolve an action into its typed control form.
    pub fn classify(&self, action: &Action) -> ControlAction {
        let text = |key: &str| action.str_param(key).unwrap_or_default().to_string();
        match self.role_of(&action.name) {
            ActionRole::Announce => ControlAction::Announce {
                message: text("message"),
            },
            ActionRole::Terminal => ControlAction::Terminal {
                message: action.str_param("message").map(str::to_string),
            },
            ActionRole::InvokeAgent => ControlAction::InvokeAgent {
                agent_type: text("agent_type"),
                prompt: text("prompt"),
            },
            ActionRole::ReturnToMain => ControlAction::ReturnToMain {
                response: text("response"),
            },
            ActionRole::Tool => ControlAction::Tool,
        }
    }
}

/// A parsed action viewed through its control role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    Announce { message: String },
    Terminal { message: Option<String> },
    InvokeAgent { agent_type: String, prompt: String },
    ReturnToMain { response: String },
    Tool,
}

/// What an action produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionOutput {
    Text(String),
    Structured(Value),
}

impl ActionOutput {
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            ActionOutput::Text(s) => Cow::Borrowed(s),
            ActionOutput::Structured(v) => Cow::Owned(v.to_string()),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ActionOutput::Text(s) => Some(s),
            ActionOutput::Structured(_) => None,
        }
    }
}

impl From<String> for ActionOutput {
    fn from(s: String) -> Self {
        ActionOutput::Text(s)
    }
}

impl From<&str> for ActionOutput {
    fn from(s: &str) -> Self {
        ActionOutput::Text(s.to_string())
    }
}

/// Outcome classification of one executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// The action did what it was asked.
    Succeeded,
    /// The tool ran but reported a failure (missing file, bad pattern, ...).
    Failed,
    /// The tool was abandoned after its time limit or interrupted.
    TimedOut,
    /// The action could not run at all (unknown action, tool crashed).
    Errored,
}

impl ActionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ActionStatus::Succeeded => "SUCCESS",
            ActionStatus::Failed | ActionStatus::Errored => "FAILED",
            ActionStatus::TimedOut => "TIMED OUT",
        }
    }
}

/// The record of one executed action. Append-only once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: String,
    pub role: ActionRole,
    /// The agent that executed the action.
    pub agent: AgentRole,
    pub output: ActionOutput,
    pub parameters: Parameters,
    pub status: ActionStatus,
    /// Action-specific fields (file_path, content, ...) used by bookkeeping.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: Parameters,
    pub timestamp: DateTime<Utc>,
}

impl ActionResult {
    pub fn new(
        action: &Action,
        role: ActionRole,
        agent: AgentRole,
        status: ActionStatus,
        output: impl Into<ActionOutput>,
    ) -> Self {
        Self {
            action: action.name.clone(),
            role,
            agent,
            output: output.into(),
            parameters: action.parameters.clone(),
            status,
            extra: Parameters::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The action could not complete: unknown, crashed, timed out or interrupted.
    pub fn is_error(&self) -> bool {
        matches!(self.status, ActionStatus::Errored | ActionStatus::TimedOut)
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Succeeded
    }

    pub fn output_text(&self) -> Cow<'_, str> {
        self.output.as_text()
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_keeps_raw_parameters() {
        let action = Action::from_json("read_file", json!({"file_path": "a.rs"}));
        assert_eq!(action.parameters, action.raw_parameters);
        assert_eq!(action.str_param("file_path"), Some("a.rs"));
        assert_eq!(action.params_inline(), "file_path=a.rs");
    }

    #[test]
    fn protocol_roles() {
        let protocol = ActionProtocol::default();
        assert_eq!(protocol.role_of("respond"), ActionRole::Announce);
        assert_eq!(protocol.role_of("request_feedback"), ActionRole::Terminal);
        assert_eq!(protocol.role_of("invoke_agent"), ActionRole::InvokeAgent);
        assert_eq!(protocol.role_of("respond_to_master"), ActionRole::ReturnToMain);
        assert_eq!(protocol.role_of("read_file"), ActionRole::Tool);
        assert!(protocol.role_of("respond").is_control());
        assert!(!protocol.role_of("write_file").is_control());
    }

    #[test]
    fn protocol_rejects_shared_names() {
        let protocol = ActionProtocol {
            terminal: "respond".into(),
            ..ActionProtocol::default()
        };
        assert!(protocol.validate().is_err());
        assert!(ActionProtocol::default().validate().is_ok());
    }

    #[test]
    fn classify_control_actions() {
        let protocol = ActionProtocol::default();
        let invoke = Action::from_json(
            "invoke_agent",
            json!({"agent_type": "sub_agent", "prompt": "analyze foo.py"}),
        );
        assert_eq!(
            protocol.classify(&invoke),
            ControlAction::InvokeAgent {
                agent_type: "sub_agent".into(),
                prompt: "analyze foo.py".into()
            }
        );
        let done = Action::from_json("request_feedback", json!({}));
        assert_eq!(protocol.classify(&done), ControlAction::Terminal { message: None });
        let tool = Action::from_json("list_files", json!({}));
        assert_eq!(protocol.classify(&tool), ControlAction::Tool);
    }

    #[test]
    fn result_status_flags() {
        let action = Action::from_json("read_file", json!({"file_path": "x"}));
        let ok = ActionResult::new(&action, ActionRole::Tool, AgentRole::Main, ActionStatus::Succeeded, "ok");
        assert!(ok.is_success() && !ok.is_error());

        let failed = ActionResult::new(&action, ActionRole::Tool, AgentRole::Main, ActionStatus::Failed, "Error: x");
        assert!(!failed.is_success() && !failed.is_error());

        let timed_out = ActionResult::new(&action, ActionRole::Tool, AgentRole::Main, ActionStatus::TimedOut, "slow");
        assert!(timed_out.is_error());
        assert_eq!(timed_out.status.label(), "TIMED OUT");
    }

    #[test]
    fn structured_output_renders_as_json() {
        let output = ActionOutput::Structured(json!({"count": 2}));
        assert_eq!(output.as_text(), "{\"count\":2}");
        assert!(output.text().is_none());
    }
}
