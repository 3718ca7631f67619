use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceHealth {
    /// Always `"ok"` while the process is serving.
    pub status: String,
    pub version: String,
    /// Model the chat and edit calls are sent to.
    pub model: String,
    /// `false` means chat and edit requests will fail with 500 until
    /// `ANTHROPIC_API_KEY` is set.
    pub api_key_configured: bool,
}
