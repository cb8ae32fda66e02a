//! Agent identity and autonomy types.

use serde::{Deserialize, Serialize};

/// Which logical agent currently owns the conversation.
///
/// The main agent talks to the user; a sub-agent is invoked by the main
/// agent for a focused task and hands its result back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    #[default]
    Main,
    Sub,
}

impl AgentRole {
    /// Resolve the `agent_type` parameter of a delegation action.
    pub fn from_agent_type(agent_type: &str) -> Option<Self> {
        match agent_type.trim().to_ascii_lowercase().as_str() {
            "sub_agent" | "sub" | "subagent" => Some(AgentRole::Sub),
            "main_agent" | "main" => Some(AgentRole::Main),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Main => "main",
            AgentRole::Sub => "sub",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much freedom the agent has to act.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Can only read, never write or execute
    ReadOnly,
    /// Must ask permission for writes and commands (default)
    #[default]
    Supervised,
    /// Full autonomy: execute everything
    Full,
}

impl std::str::FromStr for AutonomyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read_only" | "readonly" => Ok(AutonomyLevel::ReadOnly),
            "supervised" => Ok(AutonomyLevel::Supervised),
            "full" => Ok(AutonomyLevel::Full),
            other => Err(format!("unknown autonomy level '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autonomy_defaults_to_supervised() {
        assert_eq!(AutonomyLevel::default(), AutonomyLevel::Supervised);
        assert_eq!("full".parse::<AutonomyLevel>().unwrap(), AutonomyLevel::Full);
        assert!("reckless".parse::<AutonomyLevel>().is_err());
    }

    #[test]
    fn agent_type_resolution() {
        assert_eq!(AgentRole::from_agent_type("sub_agent"), Some(AgentRole::Sub));
        assert_eq!(AgentRole::from_agent_type(" Main "), Some(AgentRole::Main));
        assert_eq!(AgentRole::from_agent_type("critic"), None);
        assert_eq!(AgentRole::default(), AgentRole::Main);
    }
}
