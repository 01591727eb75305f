//! Application state: upstream configuration and the hand-off store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Environment-driven configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub upstream_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Stored hand-off payloads older than this are evicted.
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let retention_secs = std::env::var("HANDOFF_RETENTION_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(600);
        Self {
            upstream_url: std::env::var("UPSTREAM_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1/chat/completions".into()),
            api_key: std::env::var("UPSTREAM_API_KEY").ok(),
            model: std::env::var("UPSTREAM_MODEL")
                .unwrap_or_else(|_| "meta-llama/llama-3-8b-instruct".into()),
            retention: Duration::from_secs(retention_secs),
            sweep_interval: Duration::from_secs(60),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        }
    }
}

/// One parked hand-off payload.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub payload: serde_json::Value,
    pub created: DateTime<Utc>,
}

pub struct AppState {
    pub config: ServerConfig,
    pub http: reqwest::Client,
    store: DashMap<String, StoredEntry>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            store: DashMap::new(),
        }
    }

    pub fn store_payload(&self, payload: serde_json::Value) -> String {
        let id = Uuid::new_v4().to_string();
        self.store.insert(
            id.clone(),
            StoredEntry {
                payload,
                created: Utc::now(),
            },
        );
        id
    }

    /// Entries past the retention window are treated as absent even if the
    /// sweeper has not removed them yet.
    pub fn load_payload(&self, id: &str) -> Option<StoredEntry> {
        let entry = self.store.get(id)?;
        if self.is_expired(&entry) {
            return None;
        }
        Some(entry.clone())
    }

    fn is_expired(&self, entry: &StoredEntry) -> bool {
        let age = Utc::now().signed_duration_since(entry.created);
        age.to_std().map_or(false, |age| age > self.config.retention)
    }

    /// Drops expired entries; returns how many were evicted.
    pub fn sweep_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| {
            let age = Utc::now().signed_duration_since(entry.created);
            age.to_std().map_or(true, |age| age <= self.config.retention)
        });
        before - self.store.len()
    }

    #[cfg(test)]
    fn insert_with_created(&self, id: &str, created: DateTime<Utc>) {
        self.store.insert(
            id.to_string(),
            StoredEntry {
                payload: serde_json::json!({"probe": true}),
                created,
            },
        );
    }
}

/// Periodic eviction of stale hand-off payloads.
pub fn spawn_sweeper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(state.config.sweep_interval);
        loop {
            tick.tick().await;
            let evicted = state.sweep_expired();
            if evicted > 0 {
                tracing::debug!(evicted, "swept expired hand-off payloads");
            }
        }
    })
}
