//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON body of the form
//! `{"detail": "..."}` (the field the web client reads) with a matching status.
//!
//! Store and gateway errors convert through `From`, so handlers just use `?`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::gateway::GatewayError;
use crate::store::StoreError;

/// All errors that can occur in the request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The model provider credential is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The system prompt resource is absent.
    #[error("system prompt missing: {0}")]
    PromptMissing(String),

    /// Optimistic-lock violation on a prompt write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Prompt storage I/O failed.
    #[error("storage error: {0}")]
    Storage(#[source] std::io::Error),

    /// The request body was malformed or out of bounds.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The model provider call failed (non-streaming path).
    #[error("model gateway error: {0}")]
    Gateway(#[source] GatewayError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ServerError::Configuration(_)
            | ServerError::PromptMissing(_)
            | ServerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ServerError::Validation(m) => m.clone(),
            ServerError::Conflict(_) => {
                "プロンプトが別の操作で変更されています。最新の内容を確認してください。".to_owned()
            }
            ServerError::Configuration(m) => {
                error!(message = %m, "configuration error");
                "ANTHROPIC_API_KEY が設定されていません".to_owned()
            }
            ServerError::PromptMissing(location) => {
                error!(location = %location, "system prompt file missing");
                "system_prompt.md が見つかりません".to_owned()
            }
            ServerError::Storage(e) => {
                error!(error = %e, "system prompt storage error");
                format!("システムプロンプトの読み書きに失敗しました: {e}")
            }
            ServerError::Gateway(e) => format!("API呼び出しに失敗しました: {e}"),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(location) => ServerError::PromptMissing(location),
            conflict @ StoreError::Conflict { .. } => ServerError::Conflict(conflict.to_string()),
            StoreError::Storage(io) => ServerError::Storage(io),
        }
    }
}

impl From<GatewayError> for ServerError {
    fn from(e: GatewayError) -> Self {
        match e {
            config @ GatewayError::Configuration => ServerError::Configuration(config.to_string()),
            other => ServerError::Gateway(other),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
