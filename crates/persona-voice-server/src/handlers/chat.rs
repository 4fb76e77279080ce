use crate::models::chat::*;
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Instant;
use tracing::{info, info_span, Instrument};

/// `POST /chat`: one conversational turn, answered as speech or text.
pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("chat", %request_id);

    async move {
        let start_time = Instant::now();

        if request.text.trim().is_empty() {
            return Err(ApiError::BadRequest("text must not be empty".to_string()));
        }

        info!("Chat request: text_len={}", request.text.len());

        let reply = state.conversation_manager.respond(&request.text).await?;

        let speech = &state.settings.speech;
        if !speech.enabled {
            info!(
                "Chat completed in {}ms (text reply)",
                start_time.elapsed().as_millis()
            );
            return Ok(Json(ChatReply { reply }).into_response());
        }

        let audio = state
            .speech_provider
            .synthesize(&reply)
            .await
            .map_err(ApiError::from_speech)?;

        info!(
            "Chat completed in {}ms ({} audio bytes)",
            start_time.elapsed().as_millis(),
            audio.len()
        );

        Ok((
            [
                (header::CONTENT_TYPE, "audio/mpeg".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", speech.file_name),
                ),
            ],
            audio,
        )
            .into_response())
    }
    .instrument(span)
    .await
}
