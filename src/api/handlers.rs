//! API Handlers
//!
//! HTTP request handlers exposing each cache operation.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::{Cache, CacheValue};
use crate::error::{CacheError, Result};
use crate::models::{
    CounterResponse, DeleteResponse, ExistsResponse, FlushResponse, GetResponse, HealthResponse,
    SetRequest, SetResponse,
};

/// Application state shared across all handlers.
///
/// Carries the cache instance into every request, whichever adapter backs it.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache adapter
    pub cache: Arc<dyn Cache>,
}

impl AppState {
    /// Creates a new AppState around a started cache.
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }
}

/// Handler for PUT /set
///
/// Stores a key-value pair in the cache with optional TTL.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidKey(error_msg));
    }

    let value = CacheValue::from_json(req.value);
    state
        .cache
        .put(&req.key, value, req.ttl.unwrap_or(0))
        .await?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
///
/// Retrieves a value from the cache by key.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state
        .cache
        .get(&key)
        .await
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value.to_json())))
}

/// Handler for DELETE /del/:key
///
/// Deletes a key from the cache. Deleting an absent key succeeds.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.cache.delete(&key).await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /incr/:key
pub async fn incr_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CounterResponse>> {
    state.cache.incr(&key).await?;
    Ok(Json(counter_response(&state, key).await))
}

/// Handler for POST /decr/:key
pub async fn decr_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CounterResponse>> {
    state.cache.decr(&key).await?;
    Ok(Json(counter_response(&state, key).await))
}

async fn counter_response(state: &AppState, key: String) -> CounterResponse {
    let value = state
        .cache
        .get(&key)
        .await
        .map(|v| v.to_json())
        .unwrap_or(serde_json::Value::Null);
    CounterResponse::new(key, value)
}

/// Handler for GET /exists/:key
pub async fn exists_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<ExistsResponse> {
    let exists = state.cache.is_exist(&key).await;
    Json(ExistsResponse { key, exists })
}

/// Handler for DELETE /flush
///
/// Drops every entry held by the adapter.
pub async fn flush_handler(State(state): State<AppState>) -> Result<Json<FlushResponse>> {
    state.cache.clear_all().await?;
    Ok(Json(FlushResponse::cleared(state.cache.adapter_name())))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.cache.adapter_name()))
}
