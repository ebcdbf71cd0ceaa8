#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for layer composition and portrait reframing.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation by dropping the render future (the child is killed)
//! - A `CodecPort` abstraction over probing, frame access and encoding
//! - Layer composition (intro/outro, watermark, caption, music mixing)
//! - Subject-aware portrait reframing
//! - yt-dlp backed acquisition and discovery

pub mod codec;
pub mod command;
pub mod compositor;
pub mod discovery;
pub mod download;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod reframe;
pub mod subject;

pub use codec::{render_plan, CodecPort, FfmpegCodec, Frame, RenderInput, RenderPlan};
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use compositor::{composed_resolution, LayerCompositor};
pub use discovery::{rank_candidates, search_videos, DEFAULT_MAX_RESULTS};
pub use download::{download_video, is_supported_url, AcquiredSource};
pub use error::{MediaError, MediaResult};
pub use probe::probe_video;
pub use progress::{no_progress, FfmpegProgress, ProgressCallback};
pub use reframe::{compute_crop_window, AnchorDecision, ReframeEngine, ReframeOutcome};
pub use subject::{
    BoundingBox, CenterLocator, FaceDetection, SkinToneConfig, SkinToneLocator, SubjectLocator,
};

#[cfg(feature = "opencv")]
pub use subject::{HaarCascadeLocator, DEFAULT_CASCADE_PATH};
