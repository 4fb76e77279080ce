use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Speech error: {0}")]
    SpeechError(String),

    /// Upstream call exceeded its deadline; safe to retry.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Conversation context is held by another request past the lock timeout.
    #[error("Busy: {0}")]
    Busy(String),
}

impl ApiError {
    /// Recover an `ApiError` carried inside an `anyhow::Error`, or wrap the
    /// message as an LLM failure.
    pub fn from_llm(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api) => api,
            Err(other) => ApiError::LlmError(other.to_string()),
        }
    }

    pub fn from_speech(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api) => api,
            Err(other) => ApiError::SpeechError(other.to_string()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Timeout(_) | ApiError::Busy(_))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "Invalid chat request", msg)
            }
            ApiError::LlmError(msg) => {
                tracing::error!("LLM error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error communicating with language model API",
                    msg,
                )
            }
            ApiError::SpeechError(msg) => {
                tracing::error!("Speech error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error communicating with speech API",
                    msg,
                )
            }
            ApiError::Timeout(msg) => {
                tracing::warn!("Upstream timeout: {}", msg);
                (StatusCode::GATEWAY_TIMEOUT, "Upstream API timed out", msg)
            }
            ApiError::Busy(msg) => {
                tracing::warn!("Context busy: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Conversation is busy, retry shortly",
                    msg,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_keeps_variant() {
        let err = anyhow::Error::new(ApiError::Timeout("chat completion".into()));
        let api = ApiError::from_llm(err);
        assert!(matches!(api, ApiError::Timeout(_)));
        assert!(api.is_retryable());
    }

    #[test]
    fn test_plain_error_becomes_llm_error() {
        let api = ApiError::from_llm(anyhow::anyhow!("connection reset"));
        match api {
            ApiError::LlmError(msg) => assert_eq!(msg, "connection reset"),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::LlmError("x".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::SpeechError("x".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Timeout("x".into()).into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
