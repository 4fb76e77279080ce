//! Persistence collaborators for the conversation context.
//!
//! The service is single-tenant: a store holds one logical conversation as a
//! series of records. The newest record is the live context; older records
//! are kept only when a compaction starts a new one.

mod file;
mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::ConversationContext;

pub use file::FileContextStore;
pub use memory::MemoryContextStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContextStore: Send + Sync {
    /// Most recently saved context, `None` when nothing was ever saved.
    async fn load_latest(&self) -> Result<Option<ConversationContext>>;

    /// Overwrite the most recent record, creating one if the store is empty.
    async fn upsert_current(&self, context: &ConversationContext) -> Result<()>;

    /// Append a new record, leaving earlier ones untouched.
    async fn insert_new(&self, context: &ConversationContext) -> Result<()>;

    fn backend(&self) -> &'static str;
}

/// One saved version of the context, stored as
/// `{ userInput, modelResponse, timestamp }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(flatten)]
    pub context: ConversationContext,
    pub timestamp: DateTime<Utc>,
}

impl StoredRecord {
    pub fn now(context: &ConversationContext) -> Self {
        Self {
            context: context.clone(),
            timestamp: Utc::now(),
        }
    }
}
