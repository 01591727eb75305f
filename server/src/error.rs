//! Error types for the MailGrader server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("upstream completion service failed: {0}")]
    Upstream(String),

    #[error("server is missing its upstream API key")]
    MissingApiKey,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("payload not found: {id}")),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Upstream(e) => {
                tracing::error!("Upstream error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream completion service failed".to_string(),
                )
            }
            ApiError::MissingApiKey => {
                tracing::error!("UPSTREAM_API_KEY is not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server is not configured for upstream calls".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
