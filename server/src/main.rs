//! MailGrader companion server.
//!
//! Provides the HTTP boundary the editor talks to:
//! - `/api/analyze` and `/api/fix` forward prompts to the upstream
//!   completion API and stream bare content deltas back
//! - `/api/store` and `/api/load` park oversized hand-off payloads
//!   between views, with periodic eviction

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

mod error;
mod handlers;
mod prompts;
mod sse;
mod state;

use state::{spawn_sweeper, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gmm_server=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = ServerConfig::from_env();
    let port = config.port;
    let state = Arc::new(AppState::new(config));
    let _sweeper = spawn_sweeper(Arc::clone(&state));

    // CORS configuration for browser-hosted editors
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/analyze", post(handlers::analyze))
        .route("/api/fix", post(handlers::fix))
        .route("/api/store", post(handlers::store))
        .route("/api/load", get(handlers::load))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting MailGrader server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
