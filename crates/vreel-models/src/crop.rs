//! Crop windows in source pixel space.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rectangular source region selected for the reframed output.
///
/// Height is always the full source height; only the horizontal extent is
/// reduced. Coordinates are half-open: `x1..x2`, `y1..y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CropWindow {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropWindow {
    /// Create a new crop window.
    pub const fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Window width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    /// Window height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// Width over height.
    pub fn aspect(&self) -> f64 {
        if self.height() == 0 {
            return 0.0;
        }
        self.width() as f64 / self.height() as f64
    }

    /// Horizontal center of the window.
    pub fn center_x(&self) -> f64 {
        (self.x1 as f64 + self.x2 as f64) / 2.0
    }

    /// Check the window lies inside a source frame and spans its full height.
    pub fn fits(&self, source_width: u32, source_height: u32) -> bool {
        self.x1 < self.x2 && self.x2 <= source_width && self.y1 == 0 && self.y2 == source_height
    }
}

impl fmt::Display for CropWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions() {
        let window = CropWindow::new(756, 0, 1364, 1080);
        assert_eq!(window.width(), 608);
        assert_eq!(window.height(), 1080);
        assert!((window.aspect() - 608.0 / 1080.0).abs() < 1e-9);
        assert!((window.center_x() - 1060.0).abs() < 1e-9);
        assert_eq!(window.to_string(), "(756, 0, 1364, 1080)");
    }

    #[test]
    fn test_fits() {
        let window = CropWindow::new(0, 0, 608, 1080);
        assert!(window.fits(1920, 1080));
        assert!(!window.fits(400, 1080));
        assert!(!window.fits(1920, 720));
        assert!(!CropWindow::new(10, 0, 10, 1080).fits(1920, 1080));
    }
}
