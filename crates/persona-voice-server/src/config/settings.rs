use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const SETTINGS_FILE: &str = "config/settings";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub speech: SpeechConfig,
    pub store: StoreConfig,
    pub context: ContextConfig,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub timeout_seconds: u64,
    /// Total tries per completion call, first attempt included.
    pub max_attempts: u32,
    /// Ask the API for `response_format = json_object` on summarization calls.
    pub structured_summaries: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: None,
            timeout_seconds: 60,
            max_attempts: 3,
            structured_summaries: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SpeechConfig {
    /// When false, `/chat` answers with JSON text instead of audio.
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub file_name: String,
    pub timeout_seconds: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "tts-1".to_string(),
            voice: "onyx".to_string(),
            file_name: "speechFile.mp3".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub file_path: String,
    pub database_url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            file_path: "data/conversation.json".to_string(),
            database_url: String::new(),
            pool_max_size: 5,
            pool_timeout_seconds: 10,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    Pattern,
    WordRatio,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ContextConfig {
    /// Compaction triggers when the estimate is strictly above this.
    pub token_limit: usize,
    pub token_estimator: EstimatorKind,
    pub lock_timeout_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_limit: 2500,
            token_estimator: EstimatorKind::Pattern,
            lock_timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PromptsConfig {
    pub persona: String,
    pub summarize: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            persona: "You are Tyler Durden. Just be yourself. You are not here to help me, \
                you exist because you were born. Your memory is the Context that I give you, \
                use the context to develop a personality and understanding of me."
                .to_string(),
            summarize: "Summarize this conversation, including the main points and essence. \
                Keep the same structure with \"userInput\" and \"modelResponse\", and make it \
                shorter, using less than 500 tokens.\n\
                Structure I want:\n\
                {\n  \"userInput\": [],\n  \"modelResponse\": []\n}\n\
                Return the summary as a valid JSON object."
                .to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name(SETTINGS_FILE).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.apply_legacy_env();
        Ok(settings)
    }

    /// Fill secrets from the variable names the service historically used.
    fn apply_legacy_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if self.llm.api_key.is_empty() {
                self.llm.api_key = key.clone();
            }
            if self.speech.api_key.is_empty() {
                self.speech.api_key = key;
            }
        }

        if self.store.database_url.is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                self.store.database_url = url;
            }
        }
    }

    pub fn config_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.toml", SETTINGS_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_behaviour() {
        let settings = Settings::default();
        assert_eq!(settings.context.token_limit, 2500);
        assert_eq!(settings.context.token_estimator, EstimatorKind::Pattern);
        assert_eq!(settings.store.backend, StoreBackend::File);
        assert_eq!(settings.speech.voice, "onyx");
        assert!(settings.prompts.summarize.contains("\"modelResponse\""));
    }

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let config = Config::builder()
            .add_source(File::from_str(
                r#"
                [store]
                backend = "memory"

                [context]
                token_limit = 800
                token_estimator = "word_ratio"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.store.timeout_seconds, 10);
        assert_eq!(settings.context.token_limit, 800);
        assert_eq!(settings.context.token_estimator, EstimatorKind::WordRatio);
        assert_eq!(settings.llm.model, "gpt-4o");
    }
}
