//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;
use vreel_models::{FailureKind, RenderStage};

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    #[error("Composition failed: {0}")]
    Composition(String),

    #[error("Reframe failed: {0}")]
    Reframe(String),

    #[error("Encode failed during {stage} stage: {source}")]
    Encode {
        stage: RenderStage,
        #[source]
        source: Box<MediaError>,
    },

    #[error("Resource unavailable: {0}")]
    Resource(String),

    #[error("Subject detection failed: {0}")]
    DetectionFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn acquisition(message: impl Into<String>) -> Self {
        Self::Acquisition(message.into())
    }

    pub fn composition(message: impl Into<String>) -> Self {
        Self::Composition(message.into())
    }

    pub fn reframe(message: impl Into<String>) -> Self {
        Self::Reframe(message.into())
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource(message.into())
    }

    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Attach the render stage to a codec failure.
    ///
    /// Cancellation and timeouts pass through unchanged, as do errors that
    /// already carry a stage.
    pub fn encode(stage: RenderStage, source: MediaError) -> Self {
        match source {
            MediaError::Cancelled | MediaError::Timeout(_) | MediaError::Encode { .. } => source,
            other => Self::Encode {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Failure category reported to the job caller.
    pub fn kind(&self) -> FailureKind {
        match self {
            MediaError::Acquisition(_)
            | MediaError::YtDlpNotFound
            | MediaError::FfprobeNotFound
            | MediaError::FfprobeFailed { .. }
            | MediaError::FileNotFound(_)
            | MediaError::InvalidVideo(_)
            | MediaError::JsonParse(_) => FailureKind::Acquisition,
            MediaError::Composition(_) => FailureKind::Composition,
            MediaError::Reframe(_) | MediaError::DetectionFailed(_) => FailureKind::Reframe,
            MediaError::Encode { .. }
            | MediaError::FfmpegNotFound
            | MediaError::FfmpegFailed { .. }
            | MediaError::Io(_) => FailureKind::Encode,
            MediaError::Resource(_) => FailureKind::Resource,
            MediaError::Cancelled => FailureKind::Cancelled,
            MediaError::Timeout(_) => FailureKind::Timeout,
        }
    }

    /// Stderr tail captured from a failed tool invocation, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            MediaError::Encode { source, .. } => source.stderr(),
            _ => None,
        }
    }
}
