//! Skin-tone heuristic locator.
//!
//! Classifies pixels in YCbCr space, builds a per-column occupancy histogram
//! over the upper part of the frame and turns contiguous runs of occupied
//! columns into candidate boxes. It is enough to tell which side of a
//! landscape frame a talking head is on.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rayon::prelude::*;

use super::{BoundingBox, FaceDetection, SubjectLocator};
use crate::codec::Frame;
use crate::error::{MediaError, MediaResult};

/// Tuning for [`SkinToneLocator`].
#[derive(Debug, Clone)]
pub struct SkinToneConfig {
    /// Frames wider than this are downscaled before analysis
    pub analysis_width: u32,
    /// Fraction of rows (from the top) that are scanned
    pub scan_fraction: f64,
    /// Fraction of scanned rows a column needs to count as occupied
    pub min_column_fraction: f64,
    /// Minimum run width as a fraction of the analysis width
    pub min_run_fraction: f64,
    /// Empty columns tolerated inside a run
    pub max_gap: usize,
}

impl Default for SkinToneConfig {
    fn default() -> Self {
        Self {
            analysis_width: 320,
            scan_fraction: 0.75,
            min_column_fraction: 0.08,
            min_run_fraction: 0.02,
            max_gap: 1,
        }
    }
}

/// Default [`SubjectLocator`]: skin-tone column histogram.
#[derive(Debug, Clone, Default)]
pub struct SkinToneLocator {
    config: SkinToneConfig,
}

impl SkinToneLocator {
    pub fn new(config: SkinToneConfig) -> Self {
        Self { config }
    }
}

impl SubjectLocator for SkinToneLocator {
    fn detect(&self, frame: &Frame) -> MediaResult<FaceDetection> {
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(MediaError::detection_failed("empty frame"));
        }

        let cfg = &self.config;
        let scaled;
        let image: &RgbImage = if width > cfg.analysis_width && cfg.analysis_width > 0 {
            let target_height = ((height as u64 * cfg.analysis_width as u64) / width as u64).max(1) as u32;
            scaled = imageops::resize(&frame.image, cfg.analysis_width, target_height, FilterType::Triangle);
            &scaled
        } else {
            &frame.image
        };
        let factor = width as f64 / image.width() as f64;

        let iw = image.width();
        let rows = ((image.height() as f64 * cfg.scan_fraction).ceil() as u32).clamp(1, image.height());

        let columns: Vec<u32> = (0..iw)
            .into_par_iter()
            .map(|x| (0..rows).filter(|&y| is_skin(image.get_pixel(x, y))).count() as u32)
            .collect();

        let threshold = ((rows as f64 * cfg.min_column_fraction).ceil() as u32).max(2);
        let min_run = ((iw as f64 * cfg.min_run_fraction).ceil() as usize).max(2);

        let boxes = column_runs(&columns, threshold, cfg.max_gap)
            .into_iter()
            .filter(|(start, end)| end - start + 1 >= min_run)
            .filter_map(|(start, end)| {
                let (top, bottom) = vertical_extent(image, start as u32, end as u32, rows)?;
                let b = BoundingBox::new(
                    start as f64,
                    top as f64,
                    (end - start + 1) as f64,
                    (bottom - top + 1) as f64,
                );
                Some(b.scaled(factor))
            })
            .collect();

        Ok(FaceDetection::new(boxes))
    }

    fn name(&self) -> &'static str {
        "skin_tone"
    }
}

/// YCbCr skin classification (Chai & Ngan ranges), ignoring very dark pixels.
#[inline]
pub(crate) fn is_skin(pixel: &Rgb<u8>) -> bool {
    let [r, g, b] = pixel.0.map(f32::from);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    y > 40.0 && (77.0..=127.0).contains(&cb) && (133.0..=173.0).contains(&cr)
}

/// Inclusive `(start, end)` column ranges whose count reaches `threshold`,
/// bridging gaps of at most `max_gap` columns.
fn column_runs(columns: &[u32], threshold: u32, max_gap: usize) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (x, &count) in columns.iter().enumerate() {
        if count >= threshold {
            current = match current {
                Some((start, _)) => Some((start, x)),
                None => Some((x, x)),
            };
        } else if let Some((start, last)) = current {
            if x - last > max_gap {
                runs.push((start, last));
                current = None;
            }
        }
    }
    if let Some(run) = current {
        runs.push(run);
    }
    runs
}

/// First and last scanned row holding skin within `start..=end`.
fn vertical_extent(image: &RgbImage, start: u32, end: u32, rows: u32) -> Option<(u32, u32)> {
    let has_skin = |y: u32| (start..=end).any(|x| is_skin(image.get_pixel(x, y)));
    let top = (0..rows).find(|&y| has_skin(y))?;
    let bottom = (top..rows).rev().find(|&y| has_skin(y))?;
    Some((top, bottom))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKIN: Rgb<u8> = Rgb([224, 172, 140]);
    const BACKGROUND: Rgb<u8> = Rgb([20, 60, 20]);

    fn frame_with_patch(width: u32, height: u32, x0: u32, x1: u32, y0: u32, y1: u32) -> Frame {
        let mut image = RgbImage::from_pixel(width, height, BACKGROUND);
        for y in y0..y1 {
            for x in x0..x1 {
                image.put_pixel(x, y, SKIN);
            }
        }
        Frame::new(image, 0.0)
    }

    #[test]
    fn test_skin_classification() {
        assert!(is_skin(&SKIN));
        assert!(!is_skin(&BACKGROUND));
        assert!(!is_skin(&Rgb([40, 60, 200])));
        assert!(!is_skin(&Rgb([10, 5, 5])));
    }

    #[test]
    fn test_detects_patch_position() {
        let frame = frame_with_patch(640, 360, 400, 480, 60, 180);
        let detection = SkinToneLocator::default().detect(&frame).unwrap();

        assert_eq!(detection.boxes.len(), 1);
        let anchor = detection.anchor_x().unwrap() as i64;
        assert!((anchor - 440).abs() <= 8, "anchor {} too far from 440", anchor);
    }

    #[test]
    fn test_largest_patch_wins() {
        let mut frame = frame_with_patch(640, 360, 40, 80, 60, 120);
        for y in 60..240 {
            for x in 480..600 {
                frame.image.put_pixel(x, y, SKIN);
            }
        }

        let detection = SkinToneLocator::default().detect(&frame).unwrap();
        assert_eq!(detection.boxes.len(), 2);
        let anchor = detection.anchor_x().unwrap() as i64;
        assert!((anchor - 540).abs() <= 8, "anchor {} too far from 540", anchor);
    }

    #[test]
    fn test_no_skin_finds_nothing() {
        let frame = Frame::new(RgbImage::from_pixel(320, 180, BACKGROUND), 0.0);
        let detection = SkinToneLocator::default().detect(&frame).unwrap();
        assert!(detection.is_empty());
    }

    #[test]
    fn test_column_runs_bridge_small_gaps() {
        let columns = [0, 5, 5, 0, 5, 0, 0, 5, 5];
        assert_eq!(column_runs(&columns, 3, 1), vec![(1, 4), (7, 8)]);
        assert_eq!(column_runs(&columns, 3, 0), vec![(1, 2), (4, 4), (7, 8)]);
    }
}
