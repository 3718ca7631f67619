use axum::http::HeaderValue;
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};
use tracing::warn;

use crate::config::Config;

/// CORS layer for the configured origin list.
///
/// Listed origins get credentialed CORS with methods and headers mirrored
/// from the preflight (credentials cannot be combined with `*`).  An empty
/// list or a `*` entry falls back to an uncredentialed wildcard.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let entries: Vec<&str> = config
        .cors_allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let origins: Vec<HeaderValue> = entries
        .iter()
        .filter(|s| **s != "*")
        .filter_map(|s| match s.parse() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(origin = %s, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() || entries.contains(&"*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods(Any);
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
