//! Media asset references.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fallback frame rate when a probe reports none.
pub const DEFAULT_FPS: f64 = 30.0;

/// Immutable reference to a decodable media file.
///
/// Produced by probing; owned by whichever stage produced the file and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaAsset {
    /// Location of the file
    pub path: PathBuf,
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Whether the container carries an audio stream
    pub has_audio: bool,
}

impl MediaAsset {
    /// Create a new asset description.
    pub fn new(
        path: impl Into<PathBuf>,
        duration: f64,
        width: u32,
        height: u32,
        fps: f64,
        has_audio: bool,
    ) -> Self {
        Self {
            path: path.into(),
            duration,
            width,
            height,
            fps,
            has_audio,
        }
    }

    /// Duration of one frame in seconds.
    pub fn frame_interval(&self) -> f64 {
        if self.fps > 0.0 {
            1.0 / self.fps
        } else {
            1.0 / DEFAULT_FPS
        }
    }

    /// Pixel dimensions as `(width, height)`.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether both assets share the same pixel dimensions.
    pub fn same_resolution(&self, other: &MediaAsset) -> bool {
        self.resolution() == other.resolution()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval() {
        let asset = MediaAsset::new("a.mp4", 10.0, 1920, 1080, 25.0, true);
        assert!((asset.frame_interval() - 0.04).abs() < 1e-9);

        let no_fps = MediaAsset::new("b.mp4", 10.0, 1920, 1080, 0.0, true);
        assert!((no_fps.frame_interval() - 1.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_resolution() {
        let a = MediaAsset::new("a.mp4", 1.0, 1920, 1080, 30.0, false);
        let b = MediaAsset::new("b.mp4", 2.0, 1920, 1080, 24.0, true);
        let c = MediaAsset::new("c.mp4", 2.0, 1280, 720, 24.0, true);
        assert!(a.same_resolution(&b));
        assert!(!a.same_resolution(&c));
    }
}
