//! Helpers shared by the integration tests.

#![allow(dead_code)]

use codeloop_agent::{ActionDispatcher, ContextStore, ConversationDriver, TurnState};
use codeloop_core::error::ProviderError;
use codeloop_core::message::Message;
use codeloop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use codeloop_core::{ActionProtocol, ToolRegistry};
use codeloop_security::{PermissionManager, ProjectSandbox};
use codeloop_tools::{ToolContext, default_registry};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Replays model replies in order and keeps every prompt it was sent.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.prompts.lock().unwrap().push(prompt);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted model ran out of replies");
        Ok(ProviderResponse {
            message: Message::assistant(reply),
            usage: Some(Usage {
                prompt_tokens: 100,
                completion_tokens: 20,
                total_tokens: 120,
            }),
            model: "scripted".into(),
        })
    }
}

pub fn registry(root: &Path) -> ToolRegistry {
    let ctx = ToolContext::new(
        Arc::new(ProjectSandbox::new(root, &[]).unwrap()),
        Arc::new(PermissionManager::permissive()),
    );
    default_registry(ctx)
}

pub fn dispatcher(root: &Path) -> ActionDispatcher {
    ActionDispatcher::new(Arc::new(registry(root)), ActionProtocol::default())
}

pub fn driver(model: Arc<ScriptedModel>, root: &Path) -> ConversationDriver {
    ConversationDriver::new(model, "scripted", dispatcher(root))
}

pub fn state(root: &Path, capacity: usize) -> TurnState {
    TurnState::new(
        ActionProtocol::default(),
        ContextStore::new(capacity),
        codeloop_agent::ExplorationRecord::new(root),
    )
}
