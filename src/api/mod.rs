//! HTTP API for health checks and message snapshots

use crate::chain::ChainClient;
use crate::config::ApiConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::message::CrossDomainMessage;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Latest snapshot of every message the daemon follows, by key
#[derive(Default)]
pub struct MessageBoard {
    messages: DashMap<String, CrossDomainMessage>,
}

impl MessageBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, msg: CrossDomainMessage) {
        self.messages.insert(msg.key(), msg);
    }

    pub fn get(&self, key: &str) -> Option<CrossDomainMessage> {
        self.messages.get(key).map(|entry| entry.value().clone())
    }

    /// All snapshots, ordered by key
    pub fn list(&self) -> Vec<CrossDomainMessage> {
        let mut messages: Vec<_> = self
            .messages
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        messages.sort_by_key(|msg| msg.key());
        messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Apply tracker updates until the channel closes
    pub async fn follow(self: Arc<Self>, mut updates: broadcast::Receiver<CrossDomainMessage>) {
        loop {
            match updates.recv().await {
                Ok(msg) => {
                    debug!("Board update for {}: {}", msg.key(), msg.status());
                    self.upsert(msg);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Message board skipped {} updates", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub board: Arc<MessageBoard>,
    pub chains: Vec<Arc<dyn ChainClient>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/messages", get(list_messages))
        .route("/messages/:key", get(get_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> BridgeResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Internal(format!("bind {}: {}", addr, e)))?;
    axum::serve(listener, router(state))
        .await
        .map_err(|e| BridgeError::Internal(format!("API server: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - every chain answers
async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let mut details = Vec::with_capacity(state.chains.len());
    for client in &state.chains {
        details.push(ChainHealth {
            chain_id: client.chain_id(),
            healthy: client.get_block_number().await.is_ok(),
        });
    }

    let ready = details.iter().all(|chain| chain.healthy);
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(ReadinessResponse { ready, details }))
}

async fn list_messages(State(state): State<AppState>) -> Json<MessagesResponse> {
    let messages = state.board.list();
    Json(MessagesResponse {
        count: messages.len(),
        messages,
    })
}

/// Keys contain `#`, so clients must percent-encode them
async fn get_message(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CrossDomainMessage>, StatusCode> {
    state.board.get(&key).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// Response types

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    details: Vec<ChainHealth>,
}

#[derive(Debug, Serialize)]
struct ChainHealth {
    chain_id: u64,
    healthy: bool,
}

#[derive(Debug, Serialize)]
struct MessagesResponse {
    count: usize,
    messages: Vec<CrossDomainMessage>,
}
