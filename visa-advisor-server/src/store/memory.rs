use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{PromptBackend, StoreError};

/// In-process prompt backend.  `None` stands for "no prompt deployed".
#[derive(Debug, Default)]
pub struct MemoryBackend {
    content: RwLock<Option<String>>,
    fail_saves: AtomicBool,
}

impl MemoryBackend {
    pub fn new(initial: Option<&str>) -> Self {
        Self {
            content: RwLock::new(initial.map(str::to_owned)),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Make every subsequent [`PromptBackend::save`] fail with an I/O error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Current stored value, bypassing the store.
    pub async fn snapshot(&self) -> Option<String> {
        self.content.read().await.clone()
    }
}

#[async_trait]
impl PromptBackend for MemoryBackend {
    async fn load(&self) -> Result<String, StoreError> {
        self.content
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::NotFound(self.location()))
    }

    async fn save(&self, content: &str) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Storage(std::io::Error::other(
                "simulated write failure",
            )));
        }
        *self.content.write().await = Some(content.to_owned());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_owned()
    }
}
