use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::models::chat::ChatMessage;
use crate::utils::error::ApiError;
use crate::utils::{extract_json_object, TokenEstimator};

use super::context_builder::ContextBuilder;
use super::store::ContextStore;
use super::types::{ConversationContext, TurnPhase};

/// Trait for LLM service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Same as `generate`, asking the API for a JSON object reply.
    async fn generate_json(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub token_limit: usize,
    pub lock_timeout: Duration,
    pub store_timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub structured_summaries: bool,
}

impl ManagerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            token_limit: settings.context.token_limit,
            lock_timeout: Duration::from_millis(settings.context.lock_timeout_ms),
            store_timeout: Duration::from_secs(settings.store.timeout_seconds),
            max_attempts: settings.llm.max_attempts,
            retry_backoff: Duration::from_secs(1),
            structured_summaries: settings.llm.structured_summaries,
        }
    }
}

/// The one in-memory conversation and its id counter.
#[derive(Debug, Default)]
pub struct ContextState {
    context: ConversationContext,
    next_id: u64,
    loaded: bool,
    /// Set when loading failed or a new-record save failed: the store may
    /// hold a record this process must not overwrite, so the next save
    /// inserts.
    detached: bool,
}

impl ContextState {
    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Record a completed turn under the current counter value.
    pub fn append_turn(&mut self, user_input: &str, model_response: &str) -> u64 {
        let id = self.next_id;
        self.context.push_turn(user_input, model_response, id);
        self.next_id += 1;
        id
    }

    /// Swap in a whole new history, deriving the counter from it.
    pub fn replace(&mut self, context: ConversationContext) {
        self.next_id = context.next_id();
        self.context = context;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub context: ConversationContext,
    pub next_id: u64,
    pub loaded: bool,
}

impl From<&ContextState> for ContextSnapshot {
    fn from(state: &ContextState) -> Self {
        Self {
            context: state.context.clone(),
            next_id: state.next_id,
            loaded: state.loaded,
        }
    }
}

/// Owns the conversation history: loads it, keeps it under the token budget
/// by asking the model for a summary, records turns, and saves it.
///
/// Every request runs start to finish under one lock, so concurrent chats
/// are applied one after the other instead of racing on the counter.
pub struct ConversationManager {
    state: Mutex<ContextState>,
    store: Arc<dyn ContextStore>,
    llm_provider: Arc<dyn LlmProvider>,
    estimator: Arc<dyn TokenEstimator>,
    context_builder: ContextBuilder,
    config: ManagerConfig,
}

impl ConversationManager {
    pub fn new(
        store: Arc<dyn ContextStore>,
        llm_provider: Arc<dyn LlmProvider>,
        estimator: Arc<dyn TokenEstimator>,
        context_builder: ContextBuilder,
        config: ManagerConfig,
    ) -> Self {
        Self {
            state: Mutex::new(ContextState::default()),
            store,
            llm_provider,
            estimator,
            context_builder,
            config,
        }
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }

    async fn lock_state(&self) -> Result<MutexGuard<'_, ContextState>, ApiError> {
        tokio::time::timeout(self.config.lock_timeout, self.state.lock())
            .await
            .map_err(|_| {
                ApiError::Busy(format!(
                    "conversation context still in use after {:?}",
                    self.config.lock_timeout
                ))
            })
    }

    async fn with_store_timeout<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.config.store_timeout, fut)
            .await
            .map_err(|_| {
                anyhow!(
                    "{} store {} timed out after {:?}",
                    self.store.backend(),
                    op,
                    self.config.store_timeout
                )
            })?
    }

    /// Load the persisted context once per process. Later calls are no-ops.
    pub async fn ensure_loaded(&self) -> Result<(), ApiError> {
        let mut state = self.lock_state().await?;
        self.load_into(&mut state).await;
        Ok(())
    }

    async fn load_into(&self, state: &mut ContextState) {
        if state.loaded {
            return;
        }
        debug!(phase = %TurnPhase::Loading, "Loading conversation context");

        match self
            .with_store_timeout("load", self.store.load_latest())
            .await
        {
            Ok(Some(context)) => {
                info!(
                    "Loaded conversation context from {} store: {} turns",
                    self.store.backend(),
                    context.len()
                );
                state.replace(context);
            }
            Ok(None) => {
                info!(
                    "No stored conversation in {} store, starting empty",
                    self.store.backend()
                );
                state.replace(ConversationContext::new());
            }
            Err(e) => {
                error!("Error loading context from database: {:#}", e);
                state.replace(ConversationContext::new());
                state.detached = true;
            }
        }

        state.loaded = true;
    }

    /// True when the serialized context is strictly above the token limit.
    pub fn should_compact(&self, context: &ConversationContext) -> bool {
        let tokens = self.estimator.estimate(&context.to_prompt_json());
        debug!(
            phase = %TurnPhase::BudgetCheck,
            "Context tokens: {} (limit {})",
            tokens,
            self.config.token_limit
        );
        tokens > self.config.token_limit
    }

    /// Ask the model for a shorter version of `context`.
    ///
    /// Returns `None` when the call fails or the reply does not hold a usable
    /// context document; the caller then keeps the current history.
    pub async fn compact(&self, context: &ConversationContext) -> Option<ConversationContext> {
        debug!(phase = %TurnPhase::Compacting, "Summarizing {} turns", context.len());
        let messages = self.context_builder.summarize_messages(context);

        let raw = if self.config.structured_summaries {
            match self.llm_provider.generate_json(&messages).await {
                Ok(raw) => Ok(raw),
                Err(e) => {
                    warn!("Structured summary request failed, retrying as plain text: {:#}", e);
                    self.llm_provider.generate(&messages).await
                }
            }
        } else {
            self.llm_provider.generate(&messages).await
        };

        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Summary request failed, keeping full context: {:#}", e);
                return None;
            }
        };

        let compacted = parse_compacted(&raw)?;
        info!(
            "Compacted conversation from {} to {} turns",
            context.len(),
            compacted.len()
        );
        Some(compacted)
    }

    /// Save `context`: a new record after a compaction, otherwise overwrite
    /// the current one. Failures are logged and reported as `false`.
    pub async fn persist(&self, context: &ConversationContext, replaced: bool) -> bool {
        debug!(phase = %TurnPhase::Persisting, replaced, "Saving {} turns", context.len());

        let result = if replaced {
            self.with_store_timeout("insert", self.store.insert_new(context))
                .await
        } else {
            self.with_store_timeout("upsert", self.store.upsert_current(context))
                .await
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Error saving context to database: {:#}", e);
                false
            }
        }
    }

    async fn call_llm_with_retry(&self, messages: &[ChatMessage]) -> Result<String, ApiError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.llm_provider.generate(messages).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let err = ApiError::from_llm(e);
                    if attempt >= max_attempts {
                        error!("LLM call failed after {} attempts: {}", attempt, err);
                        return Err(err);
                    }
                    warn!("LLM call attempt {} failed: {}", attempt, err);
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Handle one chat turn and return the model's reply.
    ///
    /// Store problems never fail the turn. Only a failed completion call
    /// (or a lock timeout) is returned as an error.
    pub async fn respond(&self, user_input: &str) -> Result<String, ApiError> {
        let start_time = Instant::now();
        let mut state = self.lock_state().await?;

        self.load_into(&mut state).await;

        let mut replaced = false;
        if self.should_compact(state.context()) {
            if let Some(compacted) = self.compact(state.context()).await {
                state.replace(compacted);
                replaced = true;
            }
        }

        debug!(phase = %TurnPhase::Generating, "Requesting reply");
        let messages = self.context_builder.reply_messages(state.context(), user_input);
        let reply = match self.call_llm_with_retry(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                // Keep the compaction on record even though this turn failed.
                if replaced {
                    state.detached = !self.persist(state.context(), true).await;
                }
                return Err(e);
            }
        };

        debug!(phase = %TurnPhase::Appending, "Appending turn");
        let id = state.append_turn(user_input, &reply);

        // A failed insert stays pending: overwriting instead would lose the
        // record the compaction was meant to keep.
        let as_new_record = replaced || state.detached;
        let saved = self.persist(state.context(), as_new_record).await;
        state.detached = as_new_record && !saved;

        debug!(
            phase = %TurnPhase::Idle,
            "Turn {} done in {}ms (compacted={})",
            id,
            start_time.elapsed().as_millis(),
            replaced
        );
        Ok(reply)
    }

    pub async fn snapshot(&self) -> ContextSnapshot {
        let state = self.state.lock().await;
        ContextSnapshot::from(&*state)
    }

    /// Non-blocking snapshot; `None` while a turn is in progress.
    pub fn try_snapshot(&self) -> Option<ContextSnapshot> {
        self.state
            .try_lock()
            .ok()
            .map(|state| ContextSnapshot::from(&*state))
    }
}

/// Decode a summary reply into a context, tolerating prose around the JSON.
pub fn parse_compacted(raw: &str) -> Option<ConversationContext> {
    let Some(json) = extract_json_object(raw) else {
        warn!("Summary reply holds no JSON object, keeping full context");
        return None;
    };

    match serde_json::from_str::<ConversationContext>(json) {
        Ok(context) => Some(context),
        Err(e) => {
            error!("Error parsing summarized context: {}", e);
            None
        }
    }
}
