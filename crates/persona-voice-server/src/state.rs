use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::services::{ConversationManager, SpeechProvider};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub conversation_manager: Arc<ConversationManager>,
    pub speech_provider: Arc<dyn SpeechProvider>,
    pub settings: Arc<Settings>,
}

impl FromRef<AppState> for Arc<ConversationManager> {
    fn from_ref(state: &AppState) -> Self {
        state.conversation_manager.clone()
    }
}

impl FromRef<AppState> for Arc<dyn SpeechProvider> {
    fn from_ref(state: &AppState) -> Self {
        state.speech_provider.clone()
    }
}
