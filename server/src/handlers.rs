//! HTTP handlers for the MailGrader server

use axum::{
    body::Body,
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::prompts;
use crate::sse::SseBuffer;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct StoreRequest {
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct LoadQuery {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub payload: serde_json::Value,
    pub created: DateTime<Utc>,
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Forwards the draft to the grading prompt; the response stream
/// concatenates to text with inline category tags.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PromptRequest>,
) -> Result<Response, ApiError> {
    relay_completion(state, prompts::grade_system_prompt(), request.message).await
}

/// Forwards the tagged spans to the rewrite prompt; the response stream
/// concatenates to old/optimized draft pairs.
pub async fn fix(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PromptRequest>,
) -> Result<Response, ApiError> {
    relay_completion(state, prompts::fix_system_prompt(), request.message).await
}

async fn relay_completion(
    state: Arc<AppState>,
    system_prompt: String,
    message: String,
) -> Result<Response, ApiError> {
    if message.trim().is_empty() {
        return Err(ApiError::InvalidRequest("empty message".into()));
    }
    let api_key = state
        .config
        .api_key
        .clone()
        .ok_or(ApiError::MissingApiKey)?;

    let body = serde_json::json!({
        "model": state.config.model,
        "stream": true,
        "messages": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": message },
        ],
    });

    tracing::info!(model = %state.config.model, "forwarding prompt upstream");
    let upstream = state
        .http
        .post(&state.config.upstream_url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    if !upstream.status().is_success() {
        return Err(ApiError::Upstream(format!(
            "status {}",
            upstream.status()
        )));
    }

    // Unwrap the SSE framing here so clients receive bare content deltas:
    // concatenated, the relayed stream is exactly the generated text.
    let (tx, rx) = tokio::sync::mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut upstream = upstream;
        let mut buffer = SseBuffer::default();
        loop {
            match upstream.chunk().await {
                Ok(Some(chunk)) => {
                    let text = String::from_utf8_lossy(&chunk);
                    for delta in buffer.push(&text) {
                        if tx.send(delta).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => return,
                Err(error) => {
                    tracing::warn!(%error, "upstream stream ended early");
                    return;
                }
            }
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|delta| (Ok::<_, std::convert::Infallible>(delta), rx))
    });
    Ok(Body::from_stream(stream).into_response())
}

/// Parks an oversized hand-off payload and returns its id.
pub async fn store(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StoreRequest>,
) -> Result<Json<StoreResponse>, ApiError> {
    if request.payload.is_null() {
        return Err(ApiError::InvalidRequest("null payload".into()));
    }
    let id = state.store_payload(request.payload);
    Ok(Json(StoreResponse { id }))
}

/// Retrieves a parked payload; expired or unknown ids are not found.
pub async fn load(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoadQuery>,
) -> Result<Json<LoadResponse>, ApiError> {
    state
        .load_payload(&query.id)
        .map(|entry| {
            Json(LoadResponse {
                payload: entry.payload,
                created: entry.created,
            })
        })
        .ok_or(ApiError::NotFound(query.id))
}
