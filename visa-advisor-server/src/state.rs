//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::gateway::ModelGateway;
use crate::store::PromptStore;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// The system prompt resource.
    pub prompts: PromptStore,
    /// Hosted model access.
    pub gateway: Arc<dyn ModelGateway>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("prompts", &self.prompts)
            .finish_non_exhaustive()
    }
}
