//! Relay 错误类型
use crate::config::ConfigError;
use crate::providers::ProviderError;
use crate::storage::StorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),
    #[error("Backend not configured. Call /api/configure first.")]
    NotConfigured,
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("{0}")]
    Upload(String),
    #[error(transparent)]
    Upstream(#[from] ProviderError),
    #[error("upstream idle for {0} s")]
    IdleTimeout(u64),
    #[error("File not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::UnknownFeature(_)
            | RelayError::Configuration(_)
            | RelayError::Upload(_) => StatusCode::BAD_REQUEST,
            RelayError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::NotFound => StatusCode::NOT_FOUND,
            RelayError::Storage(StorageError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            RelayError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            RelayError::Upstream(_) | RelayError::IdleTimeout(_) => StatusCode::BAD_GATEWAY,
            RelayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("[RELAY] {}", self);
        } else {
            tracing::debug!("[RELAY] {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
