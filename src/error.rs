use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    // Auth errors
    #[error("Monitoring API rejected administrative credentials")]
    AdminCredentialsRejected,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Access token is empty")]
    EmptyAccessToken,
    #[error("Unauthorized")]
    Unauthorized,

    // Subscription errors
    #[error("Subscriber not found")]
    SubscriberNotFound,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Upstream errors
    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Redis errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            // 400 Bad Request
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::EmptyAccessToken => (StatusCode::BAD_REQUEST, self.to_string()),

            // 401 Unauthorized
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),

            // 404 Not Found
            AppError::SubscriberNotFound => (StatusCode::NOT_FOUND, self.to_string()),

            // 502 Bad Gateway
            AppError::AdminCredentialsRejected => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Upstream { service, status, .. } => {
                tracing::error!("Upstream error: {}", self);
                (
                    StatusCode::BAD_GATEWAY,
                    format!("{} returned {}", service, status),
                )
            }
            AppError::Http(e) => {
                tracing::error!("HTTP error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Monitoring service unavailable".to_string(),
                )
            }

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
