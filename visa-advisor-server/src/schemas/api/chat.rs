//! Chat request body.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

pub use crate::gateway::ChatMessage;

/// Request body for `POST /api/chat`.
///
/// The client sends the whole conversation every turn; the server keeps no
/// history of its own.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ChatRequest {
    /// 1 to 100 messages, oldest first.
    #[validate(length(min = 1, max = 100), nested)]
    pub messages: Vec<ChatMessage>,
}

// ── Tests ──────────────────────────────────────────────────────────────────────
