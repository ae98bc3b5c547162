//! Run-scoped temporary workspaces.
//!
//! Each pipeline run owns one directory under the worker's work dir. The
//! directory must be released on every exit path; `cleanup()` is the
//! explicit path and `Drop` is the last-resort one for panics.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::MediaResult;

/// Exclusively-owned scratch directory for one pipeline run.
#[derive(Debug)]
pub struct RunWorkspace {
    root: PathBuf,
    cleaned: bool,
}

impl RunWorkspace {
    /// Create a fresh workspace under `base_dir`.
    pub async fn create(base_dir: impl AsRef<Path>) -> MediaResult<Self> {
        let root = base_dir.as_ref().join(format!("run-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&root).await?;
        debug!("Created run workspace {}", root.display());
        Ok(Self {
            root,
            cleaned: false,
        })
    }

    /// The workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a file inside the workspace.
    pub fn path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Delete the workspace. Safe to call more than once.
    pub async fn cleanup(&mut self) -> MediaResult<()> {
        if self.cleaned {
            return Ok(());
        }
        self.cleaned = true;
        if self.root.exists() {
            tokio::fs::remove_dir_all(&self.root).await?;
            debug!("Removed run workspace {}", self.root.display());
        }
        Ok(())
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        if !self.cleaned && self.root.exists() {
            // Synchronous fallback; the async cleanup() is the normal path
            if let Err(e) = std::fs::remove_dir_all(&self.root) {
                warn!("Failed to remove run workspace {}: {}", self.root.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_workspace_cleanup_removes_directory() {
        let base = TempDir::new().unwrap();
        let mut ws = RunWorkspace::create(base.path()).await.unwrap();
        let root = ws.root().to_path_buf();

        tokio::fs::write(ws.path("clip.mp4"), b"data").await.unwrap();
        assert!(root.exists());

        ws.cleanup().await.unwrap();
        assert!(!root.exists());

        // Second cleanup is a no-op
        ws.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_workspace_drop_removes_directory() {
        let base = TempDir::new().unwrap();
        let root = {
            let ws = RunWorkspace::create(base.path()).await.unwrap();
            ws.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_workspaces_are_distinct() {
        let base = TempDir::new().unwrap();
        let mut a = RunWorkspace::create(base.path()).await.unwrap();
        let mut b = RunWorkspace::create(base.path()).await.unwrap();
        assert_ne!(a.root(), b.root());
        a.cleanup().await.unwrap();
        b.cleanup().await.unwrap();
    }
}
