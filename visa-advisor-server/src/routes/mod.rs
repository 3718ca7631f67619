//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional Swagger UI / OpenAPI spec endpoint (disable with `ADVISOR_ENABLE_SWAGGER=false`)
//! - Service banner and health routes
//! - The advisor API under `/api`

mod api;
pub mod doc;
mod health;
mod root;

use axum::{Router, middleware};
use std::sync::Arc;
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(root::router())
        .merge(health::router())
        .nest("/api", api::router());

    if state.config.enable_swagger {
        let docs = SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs());
        app = app.merge(docs);
    }

    app.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(trace::trace_middleware))
            .layer(cors::cors_layer(&state.config)),
    )
    .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
