//! Filesystem prompt backend.
//!
//! Saves go through a sibling temp file that is synced and then renamed over
//! the target.  Rename within one directory is atomic on the platforms we run
//! on, so readers see either the old or the new file.
//!
//! A symlinked prompt path is resolved first, so the link survives and the
//! file it points at is replaced.  The replaced file's permissions are copied
//! onto the new one.  Ownership is not carried over.

use std::fs::Permissions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{PromptBackend, StoreError};

#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file a save must replace: the symlink target when the configured
    /// path is a link, the path itself otherwise (including when absent).
    async fn save_target(&self) -> std::io::Result<PathBuf> {
        match tokio::fs::canonicalize(&self.path).await {
            Ok(real) => Ok(real),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(self.path.clone()),
            Err(e) => Err(e),
        }
    }
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "system_prompt".to_owned());
    target.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}

async fn existing_permissions(target: &Path) -> std::io::Result<Option<Permissions>> {
    match tokio::fs::metadata(target).await {
        Ok(meta) => Ok(Some(meta.permissions())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl PromptBackend for FileBackend {
    async fn load(&self) -> Result<String, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(self.location()))
            }
            Err(e) => Err(StoreError::Storage(e)),
        }
    }

    async fn save(&self, content: &str) -> Result<(), StoreError> {
        let target = self.save_target().await?;
        let permissions = existing_permissions(&target).await?;
        let tmp = temp_path_for(&target);

        let result = async {
            write_synced(&tmp, content).await?;
            if let Some(permissions) = permissions {
                tokio::fs::set_permissions(&tmp, permissions).await?;
            }
            tokio::fs::rename(&tmp, &target).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(
                        path = %tmp.display(),
                        error = %cleanup,
                        "failed to remove temp prompt file"
                    );
                }
            }
            return Err(StoreError::Storage(e));
        }

        debug!(path = %target.display(), bytes = content.len(), "prompt file replaced");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

async fn write_synced(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
