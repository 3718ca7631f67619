//! System prompt request / response bodies.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Response body for `GET /api/system-prompt`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SystemPromptResponse {
    pub content: String,
    /// 16-hex-char fingerprint; send it back as `expected_hash` when saving.
    pub hash: String,
}

/// Request body for `PUT /api/system-prompt`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SystemPromptUpdate {
    #[validate(length(min = 1, max = 500000))]
    pub content: String,
    /// Fingerprint the client last saw.  When present, the save is refused
    /// with 409 if the stored prompt has changed since.
    #[serde(default)]
    pub expected_hash: Option<String>,
}

/// Response body for a successful `PUT /api/system-prompt`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SystemPromptSaved {
    pub message: String,
    pub hash: String,
}

/// Request body for `POST /api/system-prompt/edit`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct EditInstruction {
    #[validate(length(min = 1, max = 10000))]
    pub instruction: String,
}

/// Response body for `POST /api/system-prompt/edit`.
///
/// Nothing is saved; the client commits `modified` with a PUT carrying
/// `original_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EditProposal {
    pub original: String,
    pub modified: String,
    pub original_hash: String,
}
