//! Shared helpers for unit tests.

use codeloop_core::error::ProviderError;
use codeloop_core::message::Message;
use codeloop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;

enum Script {
    Queue(Mutex<VecDeque<String>>),
    Repeat(String),
    Fail(ProviderError),
}

/// A provider that replays scripted replies and records every request.
///
/// Panics when a queued script runs out.
pub struct ScriptedProvider {
    script: Script,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<&str>) -> Self {
        Self::with_script(Script::Queue(Mutex::new(
            replies.into_iter().map(String::from).collect(),
        )))
    }

    /// Answer every call with the same reply.
    pub fn repeating(reply: &str) -> Self {
        Self::with_script(Script::Repeat(reply.to_string()))
    }

    /// Fail every call with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::with_script(Script::Fail(error))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The `index`-th request, flattened to text.
    pub fn prompt(&self, index: usize) -> Option<String> {
        self.requests.lock().unwrap().get(index).map(|r| {
            r.messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        })
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "scripted".into(),
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        match &self.script {
            Script::Queue(queue) => {
                let next = queue.lock().unwrap().pop_front();
                match next {
                    Some(reply) => Ok(text_response(&reply)),
                    None => panic!("ScriptedProvider: no more replies (call #{})", self.calls()),
                }
            }
            Script::Repeat(reply) => Ok(text_response(reply)),
            Script::Fail(error) => Err(error.clone()),
        }
    }
}
