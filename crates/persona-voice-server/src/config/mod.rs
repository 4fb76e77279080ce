pub mod settings;

pub use settings::{
    ContextConfig, EstimatorKind, LlmConfig, PromptsConfig, ServerConfig, Settings,
    SpeechConfig, StoreBackend, StoreConfig,
};
