//! Shared data models for the vreel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Media assets, layers and layer stacks
//! - Crop windows and target aspect ratios
//! - Encoding configuration
//! - Per-job configuration (layers, reframing, destination)
//! - Progress events emitted by the orchestrator
//! - Discovery candidates

pub mod aspect;
pub mod asset;
pub mod crop;
pub mod encoding;
pub mod event;
pub mod job;
pub mod layer;
pub mod video;

// Re-export common types
pub use aspect::{AspectRatio, AspectRatioParseError};
pub use asset::MediaAsset;
pub use crop::CropWindow;
pub use encoding::EncodingConfig;
pub use event::{FailureKind, JobEvent, RenderStage};
pub use job::{
    CaptionConfig, JobId, JobSpec, LayerConfig, MusicConfig, MusicExtension, ReframeConfig,
    ResolutionPolicy, SourceSpec, WatermarkConfig,
};
pub use layer::{
    AnchorPosition, AudioRole, AudioTrack, Layer, LayerKind, LayerStack, SegmentRole,
    TextStyle, TimelineSegment,
};
pub use video::VideoCandidate;
