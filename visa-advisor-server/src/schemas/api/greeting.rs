use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response body for `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceBanner {
    pub message: String,
}

/// Response body for `GET /api/initial-message`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InitialMessage {
    /// Greeting the client shows as the assistant's first turn.
    pub content: String,
}
