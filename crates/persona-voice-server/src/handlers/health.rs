use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::services::ConversationManager;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: String,
    store: String,
    /// `None` while a chat turn holds the context.
    turns: Option<usize>,
    next_id: Option<u64>,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

pub async fn readiness_check(
    State(manager): State<Arc<ConversationManager>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let store = manager.store_backend().to_string();

    let (status, body) = match manager.try_snapshot() {
        Some(snapshot) if !snapshot.loaded => (
            StatusCode::SERVICE_UNAVAILABLE,
            ReadinessResponse {
                status: "loading".to_string(),
                store,
                turns: None,
                next_id: None,
            },
        ),
        Some(snapshot) => (
            StatusCode::OK,
            ReadinessResponse {
                status: "ready".to_string(),
                store,
                turns: Some(snapshot.context.len()),
                next_id: Some(snapshot.next_id),
            },
        ),
        None => (
            StatusCode::OK,
            ReadinessResponse {
                status: "busy".to_string(),
                store,
                turns: None,
                next_id: None,
            },
        ),
    };

    (status, Json(body))
}
