//! What the model knows about the project.
//!
//! | Piece | Holds | Bounded by |
//! |-------|-------|------------|
//! | [`ContextStore`] | File contents (active) and summaries (explored) | Byte capacity, LRU eviction |
//! | [`ExplorationRecord`] | Listed directories and their children | Number of explored directories |
//!
//! Both are shared by the main agent and its sub-agents.

pub mod exploration;
pub mod store;
pub mod summarizer;
pub mod token;

pub use exploration::{ExplorationRecord, TreeNode};
pub use store::{AccessType, ContextStats, ContextStore, FileContextEntry};
pub use summarizer::{ProviderSummarizer, StructuralSummarizer, Summarizer, structural_summary};
