//! Fixed opening message for a new conversation.

use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::schemas::api::greeting::InitialMessage;
use crate::state::AppState;

/// The assistant's first turn.  The web client replays it as the first
/// message of every chat request, so it must stay byte-identical.
pub const INITIAL_MESSAGE: &str =
    "こんにちは。適切なビザの選定をお手伝いします。\n\n渡米の目的を教えてください。";

#[derive(OpenApi)]
#[openapi(paths(get_initial_message), components(schemas(InitialMessage)))]
pub struct GreetingApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/initial-message", get(get_initial_message))
}

#[utoipa::path(
    get,
    path = "/api/initial-message",
    tag = "chat",
    responses((status = 200, description = "Greeting text", body = InitialMessage))
)]
pub async fn get_initial_message() -> Json<InitialMessage> {
    Json(InitialMessage {
        content: INITIAL_MESSAGE.to_owned(),
    })
}
