//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretBox};

use crate::gateway::{CallProfile, GatewaySettings};

/// Runtime configuration for visa-advisor-server.
///
/// Every field has a default so the server starts without any environment
/// variables set.  A missing `ANTHROPIC_API_KEY` does not stop startup; chat
/// and edit requests fail until it is provided.
#[derive(Debug)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated list of origins allowed to call the API.
    pub cors_allowed_origins: String,

    /// The single system prompt file.
    pub system_prompt_path: PathBuf,

    pub anthropic_api_key: Option<SecretBox<String>>,

    /// Provider base URL; overridable for proxies and tests.
    pub anthropic_base_url: String,

    pub model_name: String,

    /// Connection retries when opening a chat stream.
    pub chat_max_retries: u32,

    pub chat_read_timeout_secs: u64,

    pub edit_read_timeout_secs: u64,

    /// Serve Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,
}

impl Default for Config {
    fn default() -> Self {
        let chat = CallProfile::chat();
        let edit = CallProfile::edit();
        Self {
            bind_address: "0.0.0.0:8000".to_owned(),
            log_level: "info".to_owned(),
            log_json: false,
            cors_allowed_origins: "http://localhost:5173".to_owned(),
            system_prompt_path: default_prompt_path(),
            anthropic_api_key: None,
            anthropic_base_url: "https://api.anthropic.com".to_owned(),
            model_name: "claude-sonnet-4-20250514".to_owned(),
            chat_max_retries: chat.retry.max_retries,
            chat_read_timeout_secs: chat.timeouts.read.as_secs(),
            edit_read_timeout_secs: edit.timeouts.read.as_secs(),
            enable_swagger: true,
        }
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env_or("ADVISOR_BIND", &defaults.bind_address),
            log_level: env_or("ADVISOR_LOG", &defaults.log_level),
            log_json: parse_flag("ADVISOR_LOG_JSON", defaults.log_json),
            cors_allowed_origins: env_or("CORS_ORIGINS", &defaults.cors_allowed_origins),
            system_prompt_path: std::env::var("SYSTEM_PROMPT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.system_prompt_path),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(|k| SecretBox::new(Box::new(k))),
            anthropic_base_url: env_or("ANTHROPIC_BASE_URL", &defaults.anthropic_base_url),
            model_name: env_or("MODEL_NAME", &defaults.model_name),
            chat_max_retries: parse_env("ADVISOR_CHAT_MAX_RETRIES", defaults.chat_max_retries),
            chat_read_timeout_secs: parse_env(
                "ADVISOR_CHAT_READ_TIMEOUT_SECS",
                defaults.chat_read_timeout_secs,
            ),
            edit_read_timeout_secs: parse_env(
                "ADVISOR_EDIT_READ_TIMEOUT_SECS",
                defaults.edit_read_timeout_secs,
            ),
            enable_swagger: parse_flag("ADVISOR_ENABLE_SWAGGER", defaults.enable_swagger),
        }
    }

    /// Gateway settings derived from this configuration.
    pub fn gateway_settings(&self) -> GatewaySettings {
        let mut chat = CallProfile::chat();
        chat.retry.max_retries = self.chat_max_retries;
        chat.timeouts.read = Duration::from_secs(self.chat_read_timeout_secs);

        let mut edit = CallProfile::edit();
        edit.timeouts.read = Duration::from_secs(self.edit_read_timeout_secs);

        GatewaySettings {
            api_key: self
                .anthropic_api_key
                .as_ref()
                .map(|k| SecretBox::new(Box::new(k.expose_secret().clone()))),
            base_url: self.anthropic_base_url.clone(),
            model: self.model_name.clone(),
            chat,
            edit,
        }
    }
}

const PROMPT_FILE: &str = "system_prompt.md";

/// The crate's own `system_prompt.md` when running from a source checkout,
/// otherwise `system_prompt.md` next to the executable.
fn default_prompt_path() -> PathBuf {
    let source_tree = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(PROMPT_FILE);
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(PROMPT_FILE)));
    pick_prompt_path(source_tree, beside_exe)
}

fn pick_prompt_path(source_tree: PathBuf, beside_exe: Option<PathBuf>) -> PathBuf {
    if source_tree.is_file() {
        return source_tree;
    }
    beside_exe.unwrap_or_else(|| PathBuf::from(PROMPT_FILE))
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}
