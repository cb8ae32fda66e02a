//! The conversation driver: the outer loop of one user turn.
//!
//! 1. Record the user message and start a fresh task.
//! 2. Assemble the prompt from the turn state and the shared context.
//! 3. Ask the provider, parse the reply into actions.
//! 4. Dispatch the batch in order and record the results.
//! 5. Stop on the terminal action, otherwise loop while the state machine
//!    asks for further actions, bounded by `max_iterations`.
//!
//! Anything that escapes the loop (a failed provider call, typically) is
//! turned into a plain-text reply, so the user always hears back.

use chrono::Utc;
use codeloop_config::AppConfig;
use codeloop_core::action::{ActionResult, ActionRole, ControlAction};
use codeloop_core::agent::AgentRole;
use codeloop_core::event::{DomainEvent, EventBus};
use codeloop_core::provider::{Provider, ProviderRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::context::{ContextStore, ExplorationRecord};
use crate::dispatcher::{ActionDispatcher, DEFAULT_COMPLETION_MESSAGE};
use crate::parser::ResponseParser;
use crate::prompt::PromptBuilder;
use crate::state::TurnState;

pub const DEFAULT_MAX_ITERATIONS: u32 = 25;

/// Prefix of the reply sent when the turn fails outright.
pub const ERROR_RESPONSE_PREFIX: &str = "An error occurred while processing your request";

const INTERRUPTED_RESPONSE: &str = "Interrupted.";

pub struct ConversationDriver {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    json_mode: bool,
    context_window: u32,
    parser: ResponseParser,
    dispatcher: ActionDispatcher,
    prompt: PromptBuilder,
    system_override: Option<String>,
    max_iterations: u32,
    dump_prompt_path: Option<PathBuf>,
    events: Arc<EventBus>,
    interrupt: Option<watch::Receiver<bool>>,
}

impl ConversationDriver {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, dispatcher: ActionDispatcher) -> Self {
        let protocol = dispatcher.protocol().clone();
        let prompt = PromptBuilder::new(protocol.clone(), dispatcher.tools().definitions());
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 4096,
            json_mode: true,
            context_window: 32_768,
            parser: ResponseParser::new(protocol),
            dispatcher,
            prompt,
            system_override: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            dump_prompt_path: None,
            events: Arc::new(EventBus::default()),
            interrupt: None,
        }
    }

    /// Build a driver with every knob taken from the loaded configuration.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>, dispatcher: ActionDispatcher) -> Self {
        let mut driver = Self::new(provider, config.default_model.clone(), dispatcher)
            .with_temperature(config.temperature)
            .with_json_mode(config.json_mode)
            .with_budget(config.context_window, config.max_tokens)
            .with_max_iterations(config.agent.max_iterations);
        if let Some(path) = &config.agent.dump_prompt_path {
            driver = driver.with_prompt_dump(path.clone());
        }
        if let Some(prompt) = &config.agent.system_prompt_override {
            driver = driver.with_system_prompt(prompt.clone());
        }
        driver
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    /// Context window of the model and the tokens kept for its reply.
    pub fn with_budget(mut self, context_window: u32, max_tokens: u32) -> Self {
        self.context_window = context_window;
        self.max_tokens = max_tokens;
        self.rebuild_prompt();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_override = Some(prompt.into());
        self.rebuild_prompt();
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Write every assembled prompt to `path` before sending it.
    pub fn with_prompt_dump(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_prompt_path = Some(path.into());
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Stop looping once the watched value becomes `true`. The owner of the
    /// sender resets it before the next turn.
    pub fn with_interrupt(mut self, interrupt: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    fn rebuild_prompt(&mut self) {
        let protocol = self.dispatcher.protocol().clone();
        let mut prompt = PromptBuilder::new(protocol, self.dispatcher.tools().definitions())
            .with_budget(self.context_window, self.max_tokens);
        if let Some(system) = &self.system_override {
            prompt = prompt.with_system_prompt(system.clone());
        }
        self.prompt = prompt;
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn prompt_builder(&self) -> &PromptBuilder {
        &self.prompt
    }

    /// A fresh conversation over `project_root` that speaks this driver's
    /// protocol.
    pub fn new_state(&self, project_root: impl AsRef<Path>, context: ContextStore) -> TurnState {
        TurnState::new(
            self.dispatcher.protocol().clone(),
            context,
            ExplorationRecord::new(project_root.as_ref()),
        )
    }

    /// Handle one user message and return the reply for the user.
    pub async fn process_message(&self, state: &mut TurnState, text: &str) -> String {
        info!(
            conversation_id = %state.conversation_id(),
            turn = state.turn_count() + 1,
            "Processing user message"
        );
        state.begin_turn(text);

        let outcome = self.run_turn(state).await;

        if state.current_agent() != AgentRole::Main {
            let from = state.switch_agent(AgentRole::Main);
            self.events.publish(DomainEvent::AgentSwitched {
                from,
                to: AgentRole::Main,
                timestamp: Utc::now(),
            });
        }

        match outcome {
            Ok(reply) => {
                state.finish_turn(reply.clone());
                reply
            }
            Err(e) => {
                warn!(error = %e, "Turn failed");
                self.events.publish(DomainEvent::ErrorOccurred {
                    context: "conversation_driver".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                format!("{ERROR_RESPONSE_PREFIX}: {e}")
            }
        }
    }

    async fn run_turn(&self, state: &mut TurnState) -> codeloop_core::Result<String> {
        let mut last_announcement: Option<String> = None;

        for iteration in 1..=self.max_iterations {
            debug!(
                iteration,
                agent = %state.current_agent(),
                "Driver iteration"
            );

            let prompt = self.prompt.build(state);
            if let Some(path) = &self.dump_prompt_path
                && let Err(e) = tokio::fs::write(path, prompt.render()).await
            {
                warn!(path = %path.display(), "Failed to dump prompt: {e}");
            }

            let mut request = ProviderRequest::new(self.model.clone(), prompt.to_messages());
            request.temperature = self.temperature;
            request.max_tokens = Some(self.max_tokens);
            request.json_mode = self.json_mode;
            request.context_window = Some(self.context_window);

            let response = self.provider.complete(request).await?;
            self.events.publish(DomainEvent::ResponseGenerated {
                conversation_id: state.conversation_id().to_string(),
                model: response.model.clone(),
                tokens_used: response.usage.as_ref().map_or(0, |u| u.total_tokens),
                timestamp: Utc::now(),
            });

            let actions = self.parser.parse(&response.message.content);
            for action in &actions {
                if let ControlAction::Announce { message } = self.parser.protocol().classify(action) {
                    last_announcement = Some(message);
                }
            }

            let terminal = state.is_terminal(&actions);
            let results = self.dispatcher.execute(&actions, state).await;
            let final_message = terminal_message(&results);
            state.record_action_results(results);

            if terminal {
                let reply = final_message.unwrap_or_else(|| DEFAULT_COMPLETION_MESSAGE.to_string());
                info!(iteration, "Turn ended by terminal action");
                return Ok(reply);
            }

            if self.interrupted() {
                info!(iteration, "Turn interrupted");
                return Ok(last_announcement.unwrap_or_else(|| INTERRUPTED_RESPONSE.to_string()));
            }

            if !state.should_continue() {
                break;
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            "Turn stopped without a terminal action"
        );
        Ok(last_announcement.unwrap_or_else(|| {
            format!(
                "Stopped after {} steps without finishing the task.",
                self.max_iterations
            )
        }))
    }

    fn interrupted(&self) -> bool {
        self.interrupt.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

fn terminal_message(results: &[ActionResult]) -> Option<String> {
    results
        .iter()
        .find(|r| r.role == ActionRole::Terminal)
        .and_then(|r| r.extra_str("message"))
        .map(str::to_string)
}
