//! Asset Store: filesystem staging area for generated and downloaded audio.
//!
//! Every asset carries an ownership tag. `Temporary` assets belong to exactly one
//! playback request and are deleted by `release()` once it reaches a terminal state;
//! `Retained` assets (e.g. the pre-roll tone) are never touched.

use crate::error::{VoiceError, VoiceResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Who owns the file behind an [`Asset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetOwnership {
    /// Deleted after its request's terminal state.
    Temporary,
    /// Shared or user-provided; left on disk.
    Retained,
}

/// A staged audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    path: PathBuf,
    ownership: AssetOwnership,
}

impl Asset {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ownership(&self) -> AssetOwnership {
        self.ownership
    }

    pub fn is_temporary(&self) -> bool {
        self.ownership == AssetOwnership::Temporary
    }

    /// File name for display (falls back to the full path).
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
    download_timeout: Duration,
    max_download_bytes: u64,
}

impl AssetStore {
    /// Open (and create if needed) a staging directory.
    pub fn open(root: impl Into<PathBuf>) -> VoiceResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        })
    }

    /// Bound how long a download may take and how large it may be.
    pub fn with_download_limits(mut self, timeout: Duration, max_bytes: u64) -> Self {
        self.download_timeout = timeout;
        self.max_download_bytes = max_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fresh_path(&self, extension: &str) -> PathBuf {
        let ext = extension.trim_start_matches('.');
        self.root.join(format!("{}.{}", Uuid::new_v4(), ext))
    }

    /// Write audio bytes under a unique name.
    pub async fn stage_bytes(
        &self,
        bytes: &[u8],
        extension: &str,
        ownership: AssetOwnership,
    ) -> VoiceResult<Asset> {
        let path = self.fresh_path(extension);
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            // A failed write may have left a truncated file behind.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), size = bytes.len(), "asset staged");
        Ok(Asset { path, ownership })
    }

    /// Register an existing file without copying it.
    pub fn adopt(&self, path: impl Into<PathBuf>, ownership: AssetOwnership) -> VoiceResult<Asset> {
        let path = path.into();
        if !path.is_file() {
            return Err(VoiceError::Validation(format!(
                "Audio file not found: {}",
                path.display()
            )));
        }
        Ok(Asset { path, ownership })
    }

    /// Download a remote file into the staging area.
    ///
    /// The whole exchange is bounded by the store's download timeout, and bodies
    /// over the size cap are refused before anything is written.
    pub async fn fetch(
        &self,
        client: &reqwest::Client,
        url: &str,
        extension: &str,
        ownership: AssetOwnership,
    ) -> VoiceResult<Asset> {
        let mut res = client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await?
            .error_for_status()?;
        if let Some(declared) = res.content_length() {
            self.check_size(declared)?;
        }
        let mut body = Vec::new();
        while let Some(chunk) = res.chunk().await? {
            self.check_size((body.len() + chunk.len()) as u64)?;
            body.extend_from_slice(&chunk);
        }
        self.stage_bytes(&body, extension, ownership).await
    }

    fn check_size(&self, size: u64) -> VoiceResult<()> {
        if size > self.max_download_bytes {
            return Err(VoiceError::Validation(format!(
                "Audio file is too large ({} bytes, limit {}).",
                size, self.max_download_bytes
            )));
        }
        Ok(())
    }

    /// Delete a temporary asset. Never fails: cleanup errors are only logged.
    pub async fn release(&self, asset: &Asset) {
        if !asset.is_temporary() {
            return;
        }
        if let Err(e) = self.try_remove(asset).await {
            warn!(error = %e, "asset cleanup failed");
        }
    }

    async fn try_remove(&self, asset: &Asset) -> VoiceResult<()> {
        match tokio::fs::remove_file(&asset.path).await {
            Ok(()) => {
                debug!(path = %asset.path.display(), "asset released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VoiceError::Cleanup(format!("{}: {}", asset.path.display(), e))),
        }
    }
}
