//! Subject location on a single frame.
//!
//! A [`SubjectLocator`] estimates where the primary subject sits in a frame.
//! The reframe engine only needs one horizontal coordinate from it, chosen by
//! [`FaceDetection::anchor_x`].

mod skin_tone;

#[cfg(feature = "opencv")]
mod haar;

pub use skin_tone::{SkinToneConfig, SkinToneLocator};

#[cfg(feature = "opencv")]
pub use haar::{HaarCascadeLocator, DEFAULT_CASCADE_PATH};

use crate::codec::Frame;
use crate::error::MediaResult;

/// Axis-aligned box in source frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center x-coordinate.
    #[inline]
    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Center y-coordinate.
    #[inline]
    pub fn cy(&self) -> f64 {
        self.y + self.height / 2.0
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Scale every coordinate by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

/// Boxes found on one frame, in detection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceDetection {
    pub boxes: Vec<BoundingBox>,
}

impl FaceDetection {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self { boxes }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Largest box; the earliest one wins ties.
    pub fn primary(&self) -> Option<&BoundingBox> {
        self.boxes.iter().fold(None, |best: Option<&BoundingBox>, b| match best {
            Some(current) if current.area() >= b.area() => Some(current),
            _ => Some(b),
        })
    }

    /// Horizontal center of the primary box, in pixels.
    pub fn anchor_x(&self) -> Option<u32> {
        self.primary().map(|b| b.cx().round().max(0.0) as u32)
    }
}

/// Estimates the primary subject's position on a frame.
#[cfg_attr(test, mockall::automock)]
pub trait SubjectLocator: Send + Sync {
    /// Detect candidate subjects. An empty result means "nothing found".
    fn detect(&self, frame: &Frame) -> MediaResult<FaceDetection>;

    fn name(&self) -> &'static str;
}

/// Locator that never finds anything, so the crop stays centered.
#[derive(Debug, Clone, Copy, Default)]
pub struct CenterLocator;

impl SubjectLocator for CenterLocator {
    fn detect(&self, _frame: &Frame) -> MediaResult<FaceDetection> {
        Ok(FaceDetection::none())
    }

    fn name(&self) -> &'static str {
        "center"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_primary_is_largest() {
        let detection = FaceDetection::new(vec![
            BoundingBox::new(100.0, 100.0, 50.0, 50.0),
            BoundingBox::new(1000.0, 200.0, 120.0, 120.0),
            BoundingBox::new(1500.0, 200.0, 60.0, 60.0),
        ]);
        assert_eq!(detection.anchor_x(), Some(1060));
    }

    #[test]
    fn test_ties_keep_first() {
        let detection = FaceDetection::new(vec![
            BoundingBox::new(0.0, 0.0, 100.0, 100.0),
            BoundingBox::new(500.0, 0.0, 100.0, 100.0),
        ]);
        assert_eq!(detection.anchor_x(), Some(50));
    }

    #[test]
    fn test_empty_detection() {
        assert!(FaceDetection::none().anchor_x().is_none());
    }

    #[test]
    fn test_center_locator_finds_nothing() {
        let frame = Frame::new(RgbImage::new(64, 36), 0.0);
        let detection = CenterLocator.detect(&frame).unwrap();
        assert!(detection.is_empty());
        assert_eq!(CenterLocator.name(), "center");
    }

    #[test]
    fn test_scaled_box() {
        let b = BoundingBox::new(10.0, 20.0, 30.0, 40.0).scaled(2.0);
        assert_eq!(b, BoundingBox::new(20.0, 40.0, 60.0, 80.0));
        assert!((b.cy() - 80.0).abs() < 1e-9);
    }
}
