//! Source acquisition using yt-dlp.
//!
//! Resolves a video URL to a local file named after the platform's video id.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Output template; yt-dlp substitutes the video id and container extension.
const OUTPUT_TEMPLATE: &str = "%(id)s.%(ext)s";

/// A downloaded source video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredSource {
    /// Platform video id, used to name every artifact of the job
    pub id: String,
    pub path: PathBuf,
    /// Container extension without the dot
    pub extension: String,
}

impl AcquiredSource {
    /// Build from the final file path yt-dlp reports.
    pub fn from_path(path: impl Into<PathBuf>) -> MediaResult<Self> {
        let path = path.into();
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                MediaError::acquisition(format!("cannot derive video id from {}", path.display()))
            })?;
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp4".to_string());
        Ok(Self {
            id,
            path,
            extension,
        })
    }
}

/// Check if a URL looks like a supported video page.
pub fn is_supported_url(url: &str) -> bool {
    let supported_domains = [
        "youtube.com",
        "youtu.be",
        "vimeo.com",
        "twitter.com",
        "x.com",
        "twitch.tv",
        "tiktok.com",
    ];

    let url = url.trim();
    (url.starts_with("http://") || url.starts_with("https://"))
        && supported_domains.iter().any(|domain| url.contains(domain))
}

fn download_args(url: &str, dest_dir: &Path) -> Vec<String> {
    let template = dest_dir.join(OUTPUT_TEMPLATE);
    vec![
        "-f".to_string(),
        "bestvideo+bestaudio/best".to_string(),
        "--merge-output-format".to_string(),
        "mp4".to_string(),
        "--no-playlist".to_string(),
        "--no-progress".to_string(),
        "-o".to_string(),
        template.to_string_lossy().into_owned(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        url.to_string(),
    ]
}

/// Download `url` into `dest_dir`.
///
/// The file is named `<id>.<ext>`; the merged container is mp4 whenever
/// separate streams had to be merged.
pub async fn download_video(url: &str, dest_dir: impl AsRef<Path>) -> MediaResult<AcquiredSource> {
    let dest_dir = dest_dir.as_ref();

    if url.trim().is_empty() {
        return Err(MediaError::acquisition("empty source url"));
    }
    if !is_supported_url(url) {
        warn!(url = %url, "URL is not on a known platform, trying anyway");
    }

    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)?;

    tokio::fs::create_dir_all(dest_dir).await.map_err(|e| {
        MediaError::resource(format!("cannot create {}: {}", dest_dir.display(), e))
    })?;

    info!(url = %url, dest = %dest_dir.display(), "Downloading source video");

    let output = Command::new("yt-dlp")
        .args(download_args(url, dest_dir))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| MediaError::acquisition(format!("failed to run yt-dlp: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("yt-dlp stderr: {}", stderr);

        let error_msg = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("unknown error");
        if stderr.contains("429") || stderr.contains("Too Many Requests") {
            warn!(url = %url, "Rate limit detected");
        }
        return Err(MediaError::acquisition(format!("yt-dlp failed: {}", error_msg)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let reported = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| MediaError::acquisition("yt-dlp did not report an output file"))?;

    let path = PathBuf::from(reported);
    if !path.exists() {
        return Err(MediaError::acquisition(format!(
            "downloaded file {} is missing",
            path.display()
        )));
    }

    let source = AcquiredSource::from_path(path)?;
    let size = tokio::fs::metadata(&source.path).await.map(|m| m.len()).unwrap_or(0);
    info!(
        id = %source.id,
        output = %source.path.display(),
        size_mb = size as f64 / (1024.0 * 1024.0),
        "Downloaded video successfully"
    );

    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquired_source_from_path() {
        let source = AcquiredSource::from_path("/tmp/work/dQw4w9WgXcQ.webm").unwrap();
        assert_eq!(source.id, "dQw4w9WgXcQ");
        assert_eq!(source.extension, "webm");

        let source = AcquiredSource::from_path("/tmp/work/abc").unwrap();
        assert_eq!(source.extension, "mp4");

        assert!(AcquiredSource::from_path("/").is_err());
    }

    #[test]
    fn test_download_args() {
        let args = download_args("https://youtu.be/abc", Path::new("/tmp/work"));
        let pos = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[pos + 1], "/tmp/work/%(id)s.%(ext)s");
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"bestvideo+bestaudio/best".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
    }

    #[test]
    fn test_supported_urls() {
        assert!(is_supported_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_supported_url("https://youtu.be/abc"));
        assert!(!is_supported_url("youtube.com/watch?v=abc"));
        assert!(!is_supported_url("https://example.com/video.mp4"));
    }

    #[tokio::test]
    async fn test_empty_url_is_acquisition_error() {
        let err = download_video("  ", "/tmp").await.unwrap_err();
        assert_eq!(err.kind(), vreel_models::FailureKind::Acquisition);
    }
}
