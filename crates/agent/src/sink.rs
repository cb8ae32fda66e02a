//! Where user-visible progress goes.
//!
//! The dispatcher reports announcements and action progress through an
//! injected [`UiSink`]. The CLI prints to the terminal; tests and embedders
//! can use [`TracingSink`] or collect the calls themselves.

use codeloop_core::action::ActionResult;
use codeloop_core::agent::AgentRole;
use tracing::info;

pub trait UiSink: Send + Sync {
    /// A message the model wants the user to see.
    fn announce(&self, agent: AgentRole, message: &str);

    /// A tool action is about to run. `summary` is a short human description.
    fn action_started(&self, _summary: &str) {}

    fn action_finished(&self, _result: &ActionResult) {}
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl UiSink for TracingSink {
    fn announce(&self, agent: AgentRole, message: &str) {
        info!(agent = %agent, message, "Agent message");
    }

    fn action_started(&self, summary: &str) {
        info!(summary, "Action started");
    }

    fn action_finished(&self, result: &ActionResult) {
        info!(action = %result.action, status = result.status.label(), "Action finished");
    }
}
