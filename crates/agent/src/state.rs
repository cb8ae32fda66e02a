//! Per-conversation turn state machine.
//!
//! ```text
//! AwaitingUserInput ──user message──▶ AwaitingAgentResponse
//!         ▲                                   │ results recorded
//!         │ terminal action                   ▼
//!         └────────────────────────── AwaitingFurtherActions ◀─┐
//!                                             └────────────────┘
//! ```
//!
//! Message and action histories belong to the agent that is currently in
//! control. Switching agents checkpoints the outgoing agent into an owned
//! snapshot; the context store and exploration record are shared.

use codeloop_core::action::{Action, ActionProtocol, ActionResult};
use codeloop_core::agent::AgentRole;
use codeloop_core::message::{ConversationId, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::context::{ContextStore, ExplorationRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    #[default]
    AwaitingUserInput,
    AwaitingAgentResponse,
    AwaitingFurtherActions,
}

/// Saved conversational state of one agent. Owned values, so mutating the
/// live state after a checkpoint can never reach into the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentSnapshot {
    pub messages: Vec<Message>,
    pub actions: Vec<ActionResult>,
    pub phase: ConversationPhase,
}

impl AgentSnapshot {
    pub fn latest_action_result(&self) -> Option<&ActionResult> {
        self.actions.last()
    }
}

pub struct TurnState {
    conversation_id: ConversationId,
    protocol: ActionProtocol,
    messages: Vec<Message>,
    actions: Vec<ActionResult>,
    phase: ConversationPhase,
    task_complete: bool,
    current_agent: AgentRole,
    agent_states: HashMap<AgentRole, AgentSnapshot>,
    turn_count: u32,
    task_metadata: serde_json::Map<String, Value>,
    pub context: ContextStore,
    pub exploration: ExplorationRecord,
}

impl TurnState {
    pub fn new(protocol: ActionProtocol, context: ContextStore, exploration: ExplorationRecord) -> Self {
        Self {
            conversation_id: ConversationId::new(),
            protocol,
            messages: Vec::new(),
            actions: Vec::new(),
            phase: ConversationPhase::AwaitingUserInput,
            task_complete: false,
            current_agent: AgentRole::Main,
            agent_states: HashMap::new(),
            turn_count: 0,
            task_metadata: serde_json::Map::new(),
            context,
            exploration,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn protocol(&self) -> &ActionProtocol {
        &self.protocol
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn actions(&self) -> &[ActionResult] {
        &self.actions
    }

    /// The most recent result of the current agent.
    pub fn latest_action_result(&self) -> Option<&ActionResult> {
        self.actions.last()
    }

    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    pub fn task_complete(&self) -> bool {
        self.task_complete
    }

    pub fn current_agent(&self) -> AgentRole {
        self.current_agent
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn snapshot(&self, agent: AgentRole) -> Option<&AgentSnapshot> {
        self.agent_states.get(&agent)
    }

    pub fn receive_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
        self.phase = ConversationPhase::AwaitingAgentResponse;
    }

    /// Start a new turn: record the message, reset task bookkeeping and
    /// remember the request as the task.
    pub fn begin_turn(&mut self, text: &str) {
        self.receive_user_message(text);
        self.turn_count += 1;
        self.reset_task();
        self.store_task_data("task", text);
        debug!(turn = self.turn_count, "Turn started");
    }

    /// Close the turn with the final reply to the user.
    pub fn finish_turn(&mut self, final_response: impl Into<String>) {
        self.messages.push(Message::assistant(final_response));
        self.phase = ConversationPhase::AwaitingUserInput;
    }

    /// Append a batch of results. Each result goes to the history of the
    /// agent that produced it, which may have been switched out mid-batch.
    pub fn record_action_results(&mut self, results: Vec<ActionResult>) {
        for result in results {
            if result.agent == self.current_agent {
                self.actions.push(result);
            } else {
                self.agent_states
                    .entry(result.agent)
                    .or_default()
                    .actions
                    .push(result);
            }
        }
        self.phase = ConversationPhase::AwaitingFurtherActions;
    }

    /// True when the task is already complete or the batch contains the
    /// terminal action. No other action ends a turn.
    pub fn is_terminal(&self, actions: &[Action]) -> bool {
        self.task_complete || actions.iter().any(|a| self.protocol.is_terminal(&a.name))
    }

    /// The only gate for calling the model again without new user input.
    pub fn should_continue(&self) -> bool {
        self.phase == ConversationPhase::AwaitingFurtherActions
    }

    /// Clear per-task bookkeeping. Context and exploration are kept.
    pub fn reset_task(&mut self) {
        self.task_metadata.clear();
        self.task_complete = false;
    }

    pub fn mark_task_complete(&mut self) {
        self.task_complete = true;
    }

    pub fn store_task_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.task_metadata.insert(key.into(), value.into());
    }

    pub fn task_data(&self, key: &str) -> Option<&Value> {
        self.task_metadata.get(key)
    }

    pub fn task_str(&self, key: &str) -> Option<&str> {
        self.task_data(key).and_then(Value::as_str)
    }

    /// Checkpoint the current agent's conversational state.
    pub fn store_agent_state(&mut self) {
        let snapshot = AgentSnapshot {
            messages: self.messages.clone(),
            actions: self.actions.clone(),
            phase: self.phase,
        };
        self.agent_states.insert(self.current_agent, snapshot);
    }

    /// Checkpoint the current agent, then hand control to `target`, restoring
    /// its snapshot or starting it on a clean slate. Returns the previous agent.
    pub fn switch_agent(&mut self, target: AgentRole) -> AgentRole {
        let previous = self.current_agent;
        if previous == target {
            return previous;
        }

        self.store_agent_state();
        match self.agent_states.remove(&target) {
            Some(snapshot) => {
                self.messages = snapshot.messages;
                self.actions = snapshot.actions;
                self.phase = snapshot.phase;
            }
            None => {
                self.messages = Vec::new();
                self.actions = Vec::new();
                self.phase = ConversationPhase::AwaitingFurtherActions;
            }
        }
        self.current_agent = target;
        info!(from = %previous, to = %target, "Agent switched");
        previous
    }

    /// Hand control to a fresh sub-agent working on `prompt`.
    pub fn begin_sub_agent(&mut self, prompt: &str) {
        self.agent_states.remove(&AgentRole::Sub);
        self.switch_agent(AgentRole::Sub);
        self.store_task_data("subagent_prompt", prompt);
    }

    /// Hand the sub-agent's `response` back to the main agent.
    pub fn return_to_main(&mut self, response: &str) {
        self.store_task_data("sub_result", response);
        self.switch_agent(AgentRole::Main);
    }
}
