use crate::config::SpeechConfig;
use crate::utils::error::ApiError;
use anyhow::Result;
use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Text-to-speech collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize `text`, returning MP3 bytes.
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// Client for an OpenAI-compatible `/v1/audio/speech` endpoint.
#[derive(Clone)]
pub struct SpeechService {
    client: Client,
    config: SpeechConfig,
}

impl SpeechService {
    pub fn new(config: SpeechConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    pub async fn speech(&self, text: &str) -> Result<Bytes, ApiError> {
        debug!(
            "Synthesizing {} chars with voice={}",
            text.chars().count(),
            self.config.voice
        );

        let request = SpeechRequest {
            model: &self.config.model,
            voice: &self.config.voice,
            input: text,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/audio/speech",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout(format!("Speech synthesis timed out: {}", e))
                } else {
                    ApiError::SpeechError(format!("Failed to call speech API: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::SpeechError(format!(
                "Speech API error: {} - {}",
                status, body
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ApiError::SpeechError(format!("Failed to read audio body: {}", e)))?;

        if audio.is_empty() {
            return Err(ApiError::SpeechError(
                "Speech API returned no audio".to_string(),
            ));
        }

        Ok(audio)
    }
}

#[async_trait::async_trait]
impl SpeechProvider for SpeechService {
    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        Ok(self.speech(text).await?)
    }
}
