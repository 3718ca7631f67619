//! System prompt storage.
//!
//! [`PromptStore`] owns the optimistic-lock logic and delegates raw
//! load/save to an injected [`PromptBackend`].  The production backend is
//! [`FileBackend`]; an in-memory backend stands in for it in tests.
//!
//! Nothing is cached: every [`PromptStore::read`] goes to the backend, so an
//! operator editing the file by hand is picked up by the next request.

mod file;
#[cfg(test)]
mod memory;

pub use file::FileBackend;
#[cfg(test)]
pub use memory::MemoryBackend;

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

/// Number of hex characters kept from the SHA-256 digest.
pub const FINGERPRINT_LEN: usize = 16;

/// Errors raised by the prompt store and its backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The prompt resource does not exist.
    #[error("system prompt not found at {0}")]
    NotFound(String),

    /// The caller's expected fingerprint no longer matches the stored content.
    #[error("system prompt changed since it was read (expected {expected}, found {actual})")]
    Conflict { expected: String, actual: String },

    /// Reading or writing the backing storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Raw access to wherever the prompt text lives.
#[async_trait]
pub trait PromptBackend: Send + Sync + 'static {
    /// Load the full prompt text.  Absent resource → [`StoreError::NotFound`].
    async fn load(&self) -> Result<String, StoreError>;

    /// Replace the prompt text.  Readers must never observe a partial write,
    /// and a failed save must leave the previous content in place.
    async fn save(&self, content: &str) -> Result<(), StoreError>;

    /// Human-readable location, used in log records.
    fn location(&self) -> String;
}

/// Current prompt content together with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSnapshot {
    pub content: String,
    pub hash: String,
}

/// Short content fingerprint: SHA-256 over the UTF-8 bytes, first 16 hex chars.
///
/// Good enough to detect a concurrent edit by another operator; not meant as
/// a security primitive.
pub fn fingerprint(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest[..FINGERPRINT_LEN / 2]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Read/write façade over a [`PromptBackend`] with fingerprint-based
/// conflict detection.
#[derive(Clone)]
pub struct PromptStore {
    backend: Arc<dyn PromptBackend>,
}

impl std::fmt::Debug for PromptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PromptStore({})", self.backend.location())
    }
}

impl PromptStore {
    pub fn new(backend: Arc<dyn PromptBackend>) -> Self {
        Self { backend }
    }

    /// Load the current prompt and compute its fingerprint.
    pub async fn read(&self) -> Result<PromptSnapshot, StoreError> {
        let content = self.backend.load().await?;
        let hash = fingerprint(&content);
        Ok(PromptSnapshot { content, hash })
    }

    /// Replace the prompt, returning the new fingerprint.
    ///
    /// When `expected_hash` is given, the current content is read first and
    /// the write is refused with [`StoreError::Conflict`] if its fingerprint
    /// differs.  Without it the write is unconditional (last writer wins).
    pub async fn write(
        &self,
        content: &str,
        expected_hash: Option<&str>,
    ) -> Result<String, StoreError> {
        if let Some(expected) = expected_hash {
            let current = self.read().await?;
            if current.hash != expected {
                warn!(
                    expected = %expected,
                    actual = %current.hash,
                    "system prompt write rejected: fingerprint mismatch"
                );
                return Err(StoreError::Conflict {
                    expected: expected.to_owned(),
                    actual: current.hash,
                });
            }
        }

        self.backend.save(content).await?;
        let hash = fingerprint(content);
        info!(
            chars = content.chars().count(),
            hash = %hash,
            location = %self.backend.location(),
            "system prompt saved"
        );
        Ok(hash)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
