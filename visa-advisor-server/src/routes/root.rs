//! Service banner at `/`.

use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::schemas::api::greeting::ServiceBanner;
use crate::state::AppState;

pub const SERVICE_BANNER: &str = "米国ビザ選定アドバイザー API";

#[derive(OpenApi)]
#[openapi(paths(get_root), components(schemas(ServiceBanner)))]
pub struct RootApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_root))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "meta",
    responses((status = 200, description = "Service name", body = ServiceBanner))
)]
pub async fn get_root() -> Json<ServiceBanner> {
    Json(ServiceBanner {
        message: SERVICE_BANNER.to_owned(),
    })
}
