//! Source acquisition seam.

use async_trait::async_trait;
use std::path::Path;
use vreel_media::{download_video, AcquiredSource, MediaResult};

/// Resolves a remote source URL to a local file.
#[async_trait]
pub trait SourceAcquirer: Send + Sync {
    /// Fetch `url` into `dest_dir`.
    async fn acquire(&self, url: &str, dest_dir: &Path) -> MediaResult<AcquiredSource>;
}

/// yt-dlp backed acquirer.
#[derive(Debug, Clone, Copy, Default)]
pub struct YtDlpAcquirer;

#[async_trait]
impl SourceAcquirer for YtDlpAcquirer {
    async fn acquire(&self, url: &str, dest_dir: &Path) -> MediaResult<AcquiredSource> {
        download_video(url, dest_dir).await
    }
}
