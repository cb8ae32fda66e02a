//! The conversation core of codeloop.
//!
//! One user turn runs as a loop of **Prompt → Parse → Dispatch → Record**:
//!
//! 1. [`ConversationDriver`] assembles a prompt from the [`TurnState`] and
//!    the shared [`ContextStore`], and sends it to the provider
//! 2. [`ResponseParser`] turns the reply into an ordered list of actions,
//!    never failing (unparseable text degrades to an announcement)
//! 3. [`ActionDispatcher`] runs the actions one at a time, handling control
//!    actions itself and everything else through the tool registry
//! 4. The results go back into the turn state, and the loop continues until
//!    the model emits the terminal action
//!
//! A main agent can delegate to a sub-agent. Each agent owns its message and
//! action history; file context and directory exploration are shared.

pub mod context;
pub mod dispatcher;
pub mod driver;
pub mod parser;
pub mod prompt;
pub mod sink;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{
    AccessType, ContextStats, ContextStore, ExplorationRecord, FileContextEntry,
    ProviderSummarizer, StructuralSummarizer, Summarizer,
};
pub use dispatcher::{ActionDispatcher, PreExecuteHook};
pub use driver::ConversationDriver;
pub use parser::ResponseParser;
pub use prompt::{AssembledPrompt, PromptBuilder};
pub use sink::{TracingSink, UiSink};
pub use state::{AgentSnapshot, ConversationPhase, TurnState};
