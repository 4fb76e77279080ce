pub mod conversation;
pub mod llm_service;
pub mod speech_service;

pub use conversation::ConversationManager;
pub use llm_service::LlmService;
pub use speech_service::{SpeechProvider, SpeechService};
