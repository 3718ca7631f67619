//! Streaming chat endpoint.
//!
//! Each text fragment from the model is framed as `data: <JSON string>\n\n`.
//! The stream always ends with exactly one sentinel frame, `data: [DONE]` or
//! `data: [ERROR] <message>`, and then closes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures::StreamExt;
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::extract::ValidatedJson;
use crate::gateway::ChatEvent;
use crate::schemas::api::chat::{ChatMessage, ChatRequest};
use crate::state::AppState;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Prefix for in-band failures shown to the user.
const ERROR_PREFIX: &str = "API呼び出しに失敗しました";

#[derive(OpenApi)]
#[openapi(paths(chat), components(schemas(ChatRequest, ChatMessage)))]
pub struct ChatApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

/// Submit a chat turn and stream the reply.
///
/// Problems found before streaming starts (invalid body, missing prompt,
/// missing API key) are ordinary HTTP errors.  Anything after that arrives as
/// a final `[ERROR]` frame, since the status line has already been sent.
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Server-sent event stream of reply fragments", content_type = "text/event-stream", body = String),
        (status = 422, description = "Invalid body"),
        (status = 500, description = "Prompt missing or API key not configured"),
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<ChatRequest>,
) -> Result<Response, ServerError> {
    let snapshot = state.prompts.read().await?;

    info!(
        message_count = req.messages.len(),
        last_role = %req.messages.last().map(|m| m.role.to_string()).unwrap_or_default(),
        "chat request received"
    );

    let stream = state
        .gateway
        .stream_chat(snapshot.content, req.messages)
        .await?;

    let frames = stream
        .into_stream()
        .map(|event| Ok::<_, Infallible>(render_frame(&event)));

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}

/// Render one event as a complete SSE frame.
fn render_frame(event: &ChatEvent) -> String {
    match event {
        ChatEvent::Fragment(text) => {
            let encoded = serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_owned());
            format!("data: {encoded}\n\n")
        }
        ChatEvent::Done => "data: [DONE]\n\n".to_owned(),
        ChatEvent::Error(message) => {
            format!("data: [ERROR] {ERROR_PREFIX}: {}\n\n", single_line(message))
        }
    }
}

/// A frame's data must stay on one line.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
