pub mod chat;
pub mod greeting;
pub mod system_prompt;

use crate::state::AppState;
use utoipa::OpenApi;

use axum::Router;
use std::sync::Arc;

/// Routes nested under `/api`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(greeting::router())
        .merge(system_prompt::router())
        .merge(chat::router())
}

#[derive(OpenApi)]
#[openapi()]
pub struct ApiRoutes;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = ApiRoutes::openapi();
    spec.merge(greeting::GreetingApi::openapi());
    spec.merge(system_prompt::SystemPromptApi::openapi());
    spec.merge(chat::ChatApi::openapi());
    spec
}
