use serde::{Deserialize, Serialize};

// ===== LLM MESSAGES =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system" or "user"
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

// ===== RESPONSE MODELS =====

/// Text answer, used when speech output is switched off.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}
