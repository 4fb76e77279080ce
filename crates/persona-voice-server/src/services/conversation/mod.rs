//! Conversation memory management module
//!
//! Keeps the single shared conversation history for the process:
//! - Lazy load from the configured store
//! - Token budget check and model-driven compaction
//! - Turn bookkeeping with a monotonically increasing id
//! - Persistence after every turn

mod context_builder;
pub mod manager;
pub mod store;
pub mod types;

pub use context_builder::ContextBuilder;
pub use manager::{
    parse_compacted, ContextSnapshot, ContextState, ConversationManager, LlmProvider,
    ManagerConfig,
};
pub use store::{ContextStore, FileContextStore, MemoryContextStore, StoredRecord};
pub use types::{ConversationContext, TurnEntry, TurnPhase};

pub use crate::models::chat::ChatMessage;
