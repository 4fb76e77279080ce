use anyhow::{bail, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use persona_voice_server::config::{Settings, StoreBackend, StoreConfig};
use persona_voice_server::database::{ContextRepository, DbPool};
use persona_voice_server::router::build_router;
use persona_voice_server::services::conversation::{
    ContextBuilder, ContextStore, ConversationManager, FileContextStore, ManagerConfig,
    MemoryContextStore,
};
use persona_voice_server::services::{LlmService, SpeechService};
use persona_voice_server::state::AppState;
use persona_voice_server::utils::estimator_for;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,persona_voice_server=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("🚀 Starting persona voice server...");

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "✅ Configuration loaded (file: {}, store: {:?}, token limit: {})",
        settings.config_path().display(),
        settings.store.backend,
        settings.context.token_limit
    );

    if settings.llm.api_key.is_empty() {
        warn!("No LLM API key configured; completion calls will be rejected upstream");
    }

    // Initialize persistence
    let store = build_store(&settings.store).await?;
    info!("✅ Context store ready ({})", store.backend());

    // Initialize services
    let llm_service = Arc::new(LlmService::new(settings.llm.clone())?);
    let speech_service = Arc::new(SpeechService::new(settings.speech.clone())?);

    let conversation_manager = Arc::new(ConversationManager::new(
        store,
        llm_service,
        estimator_for(settings.context.token_estimator),
        ContextBuilder::new(&settings.prompts),
        ManagerConfig::from_settings(&settings),
    ));

    // Warm the context before taking traffic; falls back to empty on failure.
    conversation_manager.ensure_loaded().await?;

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    let body_limit = settings.server.body_limit_bytes;

    let app = build_router(
        AppState {
            conversation_manager,
            speech_provider: speech_service,
            settings: Arc::new(settings),
        },
        body_limit,
    );

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn build_store(config: &StoreConfig) -> Result<Arc<dyn ContextStore>> {
    let store: Arc<dyn ContextStore> = match config.backend {
        StoreBackend::File => {
            let store = FileContextStore::new(&config.file_path);
            info!("Using context file {}", store.path().display());
            Arc::new(store)
        }
        StoreBackend::Postgres => {
            if config.database_url.is_empty() {
                bail!("store.backend = \"postgres\" needs store.database_url or DATABASE_URL");
            }
            let pool = DbPool::new(config).await?;
            info!("✅ Database connection established");

            let repository = ContextRepository::new(pool);
            repository.ensure_schema().await?;
            info!("{} saved context version(s)", repository.count_records().await?);
            Arc::new(repository)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory context store; history is lost on restart");
            Arc::new(MemoryContextStore::new())
        }
    };

    Ok(store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
