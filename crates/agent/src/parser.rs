//! Response parser: turns one model completion into an ordered action batch.
//!
//! The model is asked for `{"actions": [{"action": ..., "parameters": {...}}]}`,
//! optionally inside a fenced code block. Anything else degrades gracefully:
//! a legacy single `"action"` object becomes a one-element batch, and text
//! that is not JSON at all becomes a single announce action carrying the raw
//! text. Parsing never fails.

use codeloop_core::action::{Action, ActionProtocol, ActionRole, Parameters};
use serde_json::Value;
use tracing::{debug, warn};

/// Message of the announce action inserted when a batch does not start with one.
pub const DEFAULT_ANNOUNCEMENT: &str = "I'm analyzing your request...";

#[derive(Debug, Clone)]
pub struct ResponseParser {
    protocol: ActionProtocol,
    default_announcement: String,
}

impl ResponseParser {
    pub fn new(protocol: ActionProtocol) -> Self {
        Self {
            protocol,
            default_announcement: DEFAULT_ANNOUNCEMENT.into(),
        }
    }

    pub fn with_default_announcement(mut self, message: impl Into<String>) -> Self {
        self.default_announcement = message.into();
        self
    }

    pub fn protocol(&self) -> &ActionProtocol {
        &self.protocol
    }

    /// Parse a completion. The result is never empty.
    pub fn parse(&self, text: &str) -> Vec<Action> {
        let value = match extract_json(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, chars = text.len(), "Model output is not valid JSON, treating it as a message");
                return vec![self.announce(text)];
            }
        };

        let Value::Object(object) = value else {
            warn!("Model output is JSON but not an object, treating it as a message");
            return vec![self.announce(text)];
        };

        if let Some(Value::Array(items)) = object.get("actions") {
            let mut actions: Vec<Action> = items
                .iter()
                .filter_map(|item| self.normalize(item))
                .collect();

            let starts_with_announce = actions
                .first()
                .is_some_and(|a| a.role(&self.protocol) == ActionRole::Announce);
            if !starts_with_announce {
                debug!("Batch does not start with an announcement, inserting one");
                actions.insert(0, self.announce(&self.default_announcement));
            }
            return actions;
        }

        if object.contains_key("action") {
            if let Some(action) = self.normalize(&Value::Object(object)) {
                return vec![action];
            }
            warn!("Single-action object has no usable action name");
            return vec![self.announce(text)];
        }

        warn!("JSON object has neither 'actions' nor 'action', treating it as a message");
        vec![self.announce(text)]
    }

    fn announce(&self, message: &str) -> Action {
        let mut parameters = Parameters::new();
        parameters.insert("message".into(), Value::String(message.to_string()));
        Action::new(self.protocol.announce.clone(), parameters)
    }

    /// Normalize one element of an action list. Elements without a name are dropped.
    fn normalize(&self, item: &Value) -> Option<Action> {
        let (name, params, alternate) = match item {
            Value::String(name) => (name.trim().to_string(), None, None),
            Value::Object(obj) => {
                let name = obj
                    .get("action")
                    .or_else(|| obj.get("name"))
                    .and_then(Value::as_str)?
                    .trim()
                    .to_string();
                (name, obj.get("parameters"), obj.get("action_input"))
            }
            _ => return None,
        };
        if name.is_empty() {
            return None;
        }

        // An empty `parameters` object next to `action_input` counts as absent.
        let params = params.filter(|p| !(alternate.is_some() && is_empty_object(p)));
        let (parameters, raw) = match (params, alternate) {
            (Some(Value::Object(map)), _) => (map.clone(), map.clone()),
            (Some(Value::Null) | None, Some(input)) => self.from_action_input(&name, input),
            (Some(other), _) => self.from_action_input(&name, other),
            (None, None) => (Parameters::new(), Parameters::new()),
        };

        Some(Action::new(name, parameters).with_raw_parameters(raw))
    }

    /// Map an `action_input` value (or a non-object `parameters`) onto named parameters.
    fn from_action_input(&self, name: &str, input: &Value) -> (Parameters, Parameters) {
        if let Value::Object(map) = input {
            return (map.clone(), map.clone());
        }

        let mut raw = Parameters::new();
        raw.insert("action_input".into(), input.clone());

        let mut parameters = Parameters::new();
        match (input, self.canonical_parameter(name)) {
            (Value::String(_), Some(key)) => {
                parameters.insert(key.into(), input.clone());
            }
            (Value::Null, _) => {}
            _ => {
                parameters.insert("input".into(), input.clone());
            }
        }
        (parameters, raw)
    }

    /// The parameter a bare string maps to for actions that take a single string.
    fn canonical_parameter(&self, name: &str) -> Option<&'static str> {
        match self.protocol.role_of(name) {
            ActionRole::Announce | ActionRole::Terminal => return Some("message"),
            ActionRole::ReturnToMain => return Some("response"),
            ActionRole::InvokeAgent => return Some("prompt"),
            ActionRole::Tool => {}
        }
        match name {
            "read_file" => Some("file_path"),
            "write_file" => Some("file_path_content"),
            "list_files" => Some("directory"),
            "grep_files" => Some("pattern"),
            "find_files" => Some("name_pattern"),
            "execute_command" => Some("command"),
            _ => None,
        }
    }
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|map| map.is_empty())
}

/// Locate the JSON object in a completion: a fenced block first, then the
/// span from the first `{` to the last `}`, then the whole text.
fn extract_json(text: &str) -> Result<Value, serde_json::Error> {
    if let Some(block) = fenced_block(text)
        && let Ok(value) = serde_json::from_str(block)
    {
        return Ok(value);
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str(&text[start..=end])
    {
        return Ok(value);
    }

    serde_json::from_str(text.trim())
}

/// The body of the first ``` fence, skipping an optional language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = match after.find('\n') {
        Some(nl) if after[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => nl + 1,
        _ => 0,
    };
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}
