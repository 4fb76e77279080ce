use crate::config::PromptsConfig;
use crate::models::chat::ChatMessage;

use super::types::ConversationContext;

/// Builds the message lists sent to the completion API.
pub struct ContextBuilder {
    persona_instruction: String,
    summarize_instruction: String,
}

impl ContextBuilder {
    pub fn new(prompts: &PromptsConfig) -> Self {
        Self {
            persona_instruction: prompts.persona.clone(),
            summarize_instruction: prompts.summarize.clone(),
        }
    }

    fn context_message(context: &ConversationContext) -> ChatMessage {
        ChatMessage::system(format!("Context: {}", context.to_prompt_json()))
    }

    /// Serialized history, persona, then the user's message.
    pub fn reply_messages(&self, context: &ConversationContext, user_input: &str) -> Vec<ChatMessage> {
        vec![
            Self::context_message(context),
            ChatMessage::system(self.persona_instruction.clone()),
            ChatMessage::user(user_input),
        ]
    }

    pub fn summarize_messages(&self, context: &ConversationContext) -> Vec<ChatMessage> {
        vec![
            Self::context_message(context),
            ChatMessage::system(self.summarize_instruction.clone()),
        ]
    }
}
