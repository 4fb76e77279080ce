use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::services::conversation::ConversationContext;

#[derive(Debug, Clone, FromRow)]
pub struct ContextRow {
    pub id: i64,
    pub payload: Json<ConversationContext>,
    pub saved_at: DateTime<Utc>,
}
