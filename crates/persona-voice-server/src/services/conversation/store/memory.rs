use anyhow::Result;
use parking_lot::Mutex;

use super::{ContextStore, StoredRecord};
use crate::services::conversation::types::ConversationContext;

/// Process-local store; contents are lost on restart.
#[derive(Default)]
pub struct MemoryContextStore {
    records: Mutex<Vec<StoredRecord>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<StoredRecord> {
        self.records.lock().clone()
    }
}

#[async_trait::async_trait]
impl ContextStore for MemoryContextStore {
    async fn load_latest(&self) -> Result<Option<ConversationContext>> {
        Ok(self.records.lock().last().map(|r| r.context.clone()))
    }

    async fn upsert_current(&self, context: &ConversationContext) -> Result<()> {
        let mut records = self.records.lock();
        let record = StoredRecord::now(context);
        match records.last_mut() {
            Some(last) => *last = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn insert_new(&self, context: &ConversationContext) -> Result<()> {
        self.records.lock().push(StoredRecord::now(context));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(turns: &[(&str, &str)]) -> ConversationContext {
        let mut ctx = ConversationContext::new();
        for (i, (u, m)) in turns.iter().enumerate() {
            ctx.push_turn(*u, *m, i as u64);
        }
        ctx
    }

    #[tokio::test]
    async fn test_empty_store_has_no_latest() {
        let store = MemoryContextStore::new();
        assert!(store.load_latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_latest_only() {
        let store = MemoryContextStore::new();
        store.upsert_current(&ctx(&[("a", "b")])).await.unwrap();
        store.upsert_current(&ctx(&[("a", "b"), ("c", "d")])).await.unwrap();

        assert_eq!(store.records().len(), 1);
        assert_eq!(store.load_latest().await.unwrap().unwrap().len(), 2);

        store.insert_new(&ctx(&[("x", "y")])).await.unwrap();
        store.upsert_current(&ctx(&[("x", "y"), ("z", "w")])).await.unwrap();

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].context.len(), 2);
        assert_eq!(records[1].context.len(), 2);
        assert_eq!(records[1].context.turns().next(), Some(("x", "y", 0)));
    }
}
