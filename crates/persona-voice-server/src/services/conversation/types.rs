use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of a turn: what was said and the turn id it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEntry {
    pub value: String,
    pub id: u64,
}

impl TurnEntry {
    pub fn new(value: impl Into<String>, id: u64) -> Self {
        Self {
            value: value.into(),
            id,
        }
    }
}

/// Conversation history shared with the model as background.
///
/// Wire shape is `{"userInput":[{value,id}..],"modelResponse":[{value,id}..]}`,
/// the same document that is persisted and embedded in the system prompt.
/// Both sequences always have the same length and the n-th entries of each
/// share one id. Deserialization goes through [`RawContext`], so stored and
/// model-produced documents are validated the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawContext")]
pub struct ConversationContext {
    user_input: Vec<TurnEntry>,
    model_response: Vec<TurnEntry>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_turn(&mut self, user_input: impl Into<String>, model_response: impl Into<String>, id: u64) {
        self.user_input.push(TurnEntry::new(user_input, id));
        self.model_response.push(TurnEntry::new(model_response, id));
    }

    pub fn len(&self) -> usize {
        self.user_input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_input.is_empty()
    }

    pub fn user_input(&self) -> &[TurnEntry] {
        &self.user_input
    }

    pub fn model_response(&self) -> &[TurnEntry] {
        &self.model_response
    }

    /// Pairwise view: `(user input, model response, id)` in chronological order.
    pub fn turns(&self) -> impl Iterator<Item = (&str, &str, u64)> + '_ {
        self.user_input
            .iter()
            .zip(self.model_response.iter())
            .map(|(u, m)| (u.value.as_str(), m.value.as_str(), u.id))
    }

    /// Counter value to resume from after loading or replacing this context.
    pub fn next_id(&self) -> u64 {
        let by_len = self.len() as u64;
        let by_max = self.user_input.iter().map(|e| e.id + 1).max().unwrap_or(0);
        by_len.max(by_max)
    }

    /// Compact JSON, as measured by the budget check and shown to the model.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Lenient input form for [`ConversationContext`].
///
/// Entries may be `{ "value", "id" }` objects or bare strings. Ids may be
/// numbers, numeric strings, or absent. Unknown keys (timestamps, database
/// ids) are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContext {
    user_input: Vec<RawEntry>,
    model_response: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Entry {
        value: String,
        #[serde(default)]
        id: Option<serde_json::Value>,
    },
    Text(String),
}

impl RawEntry {
    fn into_parts(self) -> (String, Option<u64>) {
        match self {
            RawEntry::Entry { value, id } => {
                let id = id.and_then(|v| match v {
                    serde_json::Value::Number(n) => n.as_u64(),
                    serde_json::Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                });
                (value, id)
            }
            RawEntry::Text(value) => (value, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextShapeError {
    pub user_input: usize,
    pub model_response: usize,
}

impl fmt::Display for ContextShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "userInput has {} entries but modelResponse has {}",
            self.user_input, self.model_response
        )
    }
}

impl std::error::Error for ContextShapeError {}

impl TryFrom<RawContext> for ConversationContext {
    type Error = ContextShapeError;

    fn try_from(raw: RawContext) -> Result<Self, Self::Error> {
        if raw.user_input.len() != raw.model_response.len() {
            return Err(ContextShapeError {
                user_input: raw.user_input.len(),
                model_response: raw.model_response.len(),
            });
        }

        let pairs: Vec<((String, Option<u64>), (String, Option<u64>))> = raw
            .user_input
            .into_iter()
            .map(RawEntry::into_parts)
            .zip(raw.model_response.into_iter().map(RawEntry::into_parts))
            .collect();

        // Keep the given ids only when every pair agrees and they strictly
        // increase; anything else is renumbered by position.
        let mut previous: Option<u64> = None;
        let ids_usable = pairs.iter().all(|((_, u), (_, m))| match (u, m) {
            (Some(u), Some(m)) if u == m => {
                let increasing = previous.map_or(true, |p| *u > p);
                previous = Some(*u);
                increasing
            }
            _ => false,
        });

        let mut context = ConversationContext::new();
        for (index, ((user, user_id), (reply, _))) in pairs.into_iter().enumerate() {
            let id = match (ids_usable, user_id) {
                (true, Some(id)) => id,
                _ => index as u64,
            };
            context.push_turn(user, reply, id);
        }

        Ok(context)
    }
}

/// Per-request lifecycle phases, logged as the `phase` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Loading,
    BudgetCheck,
    Compacting,
    Generating,
    Appending,
    Persisting,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Loading => "loading",
            TurnPhase::BudgetCheck => "budget_check",
            TurnPhase::Compacting => "compacting",
            TurnPhase::Generating => "generating",
            TurnPhase::Appending => "appending",
            TurnPhase::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_turn_keeps_sequences_aligned() {
        let mut ctx = ConversationContext::new();
        ctx.push_turn("hello", "hi there", 0);
        ctx.push_turn("how are you", "alive", 1);

        assert_eq!(ctx.user_input().len(), 2);
        assert_eq!(ctx.model_response().len(), 2);
        let turns: Vec<_> = ctx.turns().collect();
        assert_eq!(turns[0], ("hello", "hi there", 0));
        assert_eq!(turns[1], ("how are you", "alive", 1));
    }

    #[test]
    fn test_wire_shape() {
        let mut ctx = ConversationContext::new();
        ctx.push_turn("hello", "hi there", 0);
        assert_eq!(
            ctx.to_prompt_json(),
            r#"{"userInput":[{"value":"hello","id":0}],"modelResponse":[{"value":"hi there","id":0}]}"#
        );
        assert_eq!(
            ConversationContext::new().to_prompt_json(),
            r#"{"userInput":[],"modelResponse":[]}"#
        );
    }

    #[test]
    fn test_next_id() {
        assert_eq!(ConversationContext::new().next_id(), 0);

        let mut ctx = ConversationContext::new();
        ctx.push_turn("a", "b", 0);
        assert_eq!(ctx.next_id(), 1);

        let mut sparse = ConversationContext::new();
        sparse.push_turn("a", "b", 7);
        assert_eq!(sparse.next_id(), 8);
    }

    #[test]
    fn test_deserialize_compacted_document() {
        let json = r#"{"userInput":[{"value":"x","id":0}],"modelResponse":[{"value":"y","id":0}]}"#;
        let ctx: ConversationContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.turns().next(), Some(("x", "y", 0)));
        assert_eq!(ctx.next_id(), 1);
    }

    #[test]
    fn test_deserialize_ignores_extra_keys() {
        let json = r#"{"_id":"abc","timestamp":"2024-05-01T10:00:00Z",
            "userInput":[{"value":"x","id":3}],"modelResponse":[{"value":"y","id":3}]}"#;
        let ctx: ConversationContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.turns().next(), Some(("x", "y", 3)));
    }

    #[test]
    fn test_bare_strings_are_numbered_by_position() {
        let json = r#"{"userInput":["a","b"],"modelResponse":["c","d"]}"#;
        let ctx: ConversationContext = serde_json::from_str(json).unwrap();
        let ids: Vec<u64> = ctx.turns().map(|(_, _, id)| id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_mismatched_ids_are_renumbered() {
        let json = r#"{"userInput":[{"value":"a","id":5},{"value":"b","id":2}],
            "modelResponse":[{"value":"c","id":5},{"value":"d","id":2}]}"#;
        let ctx: ConversationContext = serde_json::from_str(json).unwrap();
        let ids: Vec<u64> = ctx.turns().map(|(_, _, id)| id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_numeric_string_ids_are_accepted() {
        let json = r#"{"userInput":[{"value":"a","id":"4"}],"modelResponse":[{"value":"c","id":4}]}"#;
        let ctx: ConversationContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.turns().next(), Some(("a", "c", 4)));
    }

    #[test]
    fn test_rejects_missing_or_unequal_sequences() {
        assert!(serde_json::from_str::<ConversationContext>(r#"{"userInput":[]}"#).is_err());
        assert!(serde_json::from_str::<ConversationContext>(r#"{"modelResponse":[]}"#).is_err());
        assert!(serde_json::from_str::<ConversationContext>(
            r#"{"userInput":["a","b"],"modelResponse":["c"]}"#
        )
        .is_err());
    }
}
