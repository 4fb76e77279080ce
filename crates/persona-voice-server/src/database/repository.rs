use super::{ContextRow, DbPool};
use anyhow::Result;
use sqlx::types::Json;
use tracing::{debug, info};

use crate::services::conversation::{ContextStore, ConversationContext};

/// Postgres-backed context store. Each row is one saved version of the
/// conversation document; the row with the highest id is the live one.
pub struct ContextRepository {
    pool: DbPool,
}

impl ContextRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the table on first start.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS conversation_contexts (
                id BIGSERIAL PRIMARY KEY,
                payload JSONB NOT NULL,
                saved_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        )
        .execute(self.pool.get_pool())
        .await?;

        info!("conversation_contexts table ready");
        Ok(())
    }

    /// Number of saved versions, current one included.
    pub async fn count_records(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM conversation_contexts")
            .fetch_one(self.pool.get_pool())
            .await?;
        Ok(count)
    }
}

#[async_trait::async_trait]
impl ContextStore for ContextRepository {
    async fn load_latest(&self) -> Result<Option<ConversationContext>> {
        let row = sqlx::query_as::<_, ContextRow>(
            r#"SELECT id, payload, saved_at
               FROM conversation_contexts
               ORDER BY id DESC
               LIMIT 1"#,
        )
        .fetch_optional(self.pool.get_pool())
        .await?;

        if let Some(row) = &row {
            debug!("Loaded context record {} saved at {}", row.id, row.saved_at);
        }

        Ok(row.map(|r| r.payload.0))
    }

    async fn upsert_current(&self, context: &ConversationContext) -> Result<()> {
        // Update the newest row; insert only when the table is empty.
        sqlx::query(
            r#"WITH updated AS (
                   UPDATE conversation_contexts
                   SET payload = $1, saved_at = now()
                   WHERE id = (SELECT MAX(id) FROM conversation_contexts)
                   RETURNING id
               )
               INSERT INTO conversation_contexts (payload)
               SELECT $1
               WHERE NOT EXISTS (SELECT 1 FROM updated)"#,
        )
        .bind(Json(context.clone()))
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    async fn insert_new(&self, context: &ConversationContext) -> Result<()> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO conversation_contexts (payload) VALUES ($1) RETURNING id",
        )
        .bind(Json(context.clone()))
        .fetch_one(self.pool.get_pool())
        .await?;

        debug!("Inserted context record {}", id);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
