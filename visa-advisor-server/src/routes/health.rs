//! Liveness endpoint for load balancers and deploy checks.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::schemas::api::health::ServiceHealth;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health), components(schemas(ServiceHealth)))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Report liveness plus the model wiring.
///
/// Neither the prompt file nor the provider is contacted, so a slow
/// provider never makes the service look dead.
#[utoipa::path(
    get,
    path = "/health",
    tag = "meta",
    responses((status = 200, description = "Service is up", body = ServiceHealth))
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<ServiceHealth> {
    Json(ServiceHealth {
        status: "ok".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        model: state.config.model_name.clone(),
        api_key_configured: state.config.anthropic_api_key.is_some(),
    })
}
