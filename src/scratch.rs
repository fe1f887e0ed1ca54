//! Best-effort scratch file holding the last captured code.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Overwrites `path` with the latest code on every capture.
#[derive(Debug, Clone)]
pub struct CodeScratchFile {
    path: PathBuf,
}

impl CodeScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `code`, creating parent directories. Returns whether it landed.
    pub async fn store(&self, code: &str) -> bool {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %self.path.display(), "⚠️ Could not create code file directory: {e}");
                return false;
            }
        }

        match tokio::fs::write(&self.path, code).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Code written to scratch file");
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), "⚠️ Could not write code file: {e}");
                false
            }
        }
    }
}
