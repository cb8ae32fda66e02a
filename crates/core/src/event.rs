//! Domain event system: decoupled observation of what the agent does.
//!
//! The dispatcher and driver publish events; the CLI, tests or any
//! other component can subscribe without the core knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::action::ActionStatus;
use crate::agent::AgentRole;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The model produced a completion
    ResponseGenerated {
        conversation_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// An action finished executing
    ActionExecuted {
        action: String,
        agent: AgentRole,
        status: ActionStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Control moved between the main agent and a sub-agent
    AgentSwitched {
        from: AgentRole,
        to: AgentRole,
        timestamp: DateTime<Utc>,
    },

    /// Files were demoted from the active tier to summaries
    FilesEvicted {
        paths: Vec<String>,
        used_bytes: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ActionExecuted {
            action: "read_file".into(),
            agent: AgentRole::Main,
            status: ActionStatus::Succeeded,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ActionExecuted { action, status, .. } => {
                assert_eq!(action, "read_file");
                assert_eq!(*status, ActionStatus::Succeeded);
            }
            _ => panic!("Expected ActionExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ErrorOccurred {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
