//! # codeloop core
//!
//! Domain types, traits, and error definitions for the codeloop coding agent.
//! This crate performs no I/O; it defines the model that every other crate
//! implements against.
//!
//! ## Design
//!
//! Every seam is a trait here (`Provider`, `Tool`). Implementations live in
//! their own crates, which keeps the agent testable with scripted providers
//! and in-memory tools.

pub mod action;
pub mod adapter;
pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use action::{
    Action, ActionOutput, ActionProtocol, ActionResult, ActionRole, ActionStatus, ControlAction,
    Parameters,
};
pub use adapter::{LegacyTool, ToolAdapter};
pub use agent::{AgentRole, AutonomyLevel};
pub use error::{ContextError, Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use tool::{Tool, ToolDefinition, ToolRegistry, ToolResult};
