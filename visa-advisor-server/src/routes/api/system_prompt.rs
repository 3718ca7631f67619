//! System prompt endpoints: read, optimistic save, and LLM-assisted edit.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::extract::ValidatedJson;
use crate::schemas::api::system_prompt::{
    EditInstruction, EditProposal, SystemPromptResponse, SystemPromptSaved, SystemPromptUpdate,
};
use crate::state::AppState;

const SAVED_MESSAGE: &str = "保存しました";

/// How much of an edit instruction goes into the logs.
const INSTRUCTION_LOG_CHARS: usize = 50;

#[derive(OpenApi)]
#[openapi(
    paths(get_system_prompt, put_system_prompt, edit_system_prompt),
    components(schemas(
        SystemPromptResponse,
        SystemPromptUpdate,
        SystemPromptSaved,
        EditInstruction,
        EditProposal
    ))
)]
pub struct SystemPromptApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/system-prompt",
            get(get_system_prompt).put(put_system_prompt),
        )
        .route("/system-prompt/edit", post(edit_system_prompt))
}

#[utoipa::path(
    get,
    path = "/api/system-prompt",
    tag = "system-prompt",
    responses(
        (status = 200, description = "Current prompt and fingerprint", body = SystemPromptResponse),
        (status = 500, description = "Prompt file missing or unreadable"),
    )
)]
pub async fn get_system_prompt(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemPromptResponse>, ServerError> {
    let snapshot = state.prompts.read().await?;
    Ok(Json(SystemPromptResponse {
        content: snapshot.content,
        hash: snapshot.hash,
    }))
}

#[utoipa::path(
    put,
    path = "/api/system-prompt",
    tag = "system-prompt",
    request_body = SystemPromptUpdate,
    responses(
        (status = 200, description = "Saved; returns the new fingerprint", body = SystemPromptSaved),
        (status = 409, description = "Prompt changed since `expected_hash` was read"),
        (status = 422, description = "Invalid body"),
        (status = 500, description = "Write failed"),
    )
)]
pub async fn put_system_prompt(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<SystemPromptUpdate>,
) -> Result<Json<SystemPromptSaved>, ServerError> {
    let hash = state
        .prompts
        .write(&body.content, body.expected_hash.as_deref())
        .await?;
    Ok(Json(SystemPromptSaved {
        message: SAVED_MESSAGE.to_owned(),
        hash,
    }))
}

/// Ask the model to rewrite the prompt according to an instruction.
///
/// Returns a proposal only; the client saves it with a PUT carrying
/// `original_hash` so a concurrent change is caught.
#[utoipa::path(
    post,
    path = "/api/system-prompt/edit",
    tag = "system-prompt",
    request_body = EditInstruction,
    responses(
        (status = 200, description = "Proposed revision", body = EditProposal),
        (status = 422, description = "Invalid body"),
        (status = 500, description = "Prompt missing or API key not configured"),
        (status = 502, description = "Model call failed"),
    )
)]
pub async fn edit_system_prompt(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<EditInstruction>,
) -> Result<Json<EditProposal>, ServerError> {
    let snapshot = state.prompts.read().await?;
    let instruction_preview = preview(&body.instruction, INSTRUCTION_LOG_CHARS);

    info!(
        instruction = %instruction_preview,
        prompt_chars = snapshot.content.chars().count(),
        "system prompt edit started"
    );

    let modified = state
        .gateway
        .edit_prompt(&snapshot.content, &body.instruction)
        .await
        .inspect_err(|e| {
            error!(instruction = %instruction_preview, error = %e, "system prompt edit failed");
        })?;

    info!(modified_chars = modified.chars().count(), "system prompt edit completed");

    Ok(Json(EditProposal {
        original: snapshot.content,
        modified,
        original_hash: snapshot.hash,
    }))
}

/// First `max_chars` characters, with an ellipsis when truncated.
fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod test {
    use super::preview;

    #[test]
    fn preview_truncates_on_char_boundaries() {
        assert_eq!(preview("短い", 50), "短い");
        assert_eq!(preview("ビザを追加", 2), "ビザ...");
        assert_eq!(preview("abc", 3), "abc");
    }
}
