//! OpenCV Haar cascade locator.

use opencv::{core, imgproc, objdetect, prelude::*};
use std::path::{Path, PathBuf};

use super::{BoundingBox, FaceDetection, SubjectLocator};
use crate::codec::Frame;
use crate::error::{MediaError, MediaResult};

/// Frontal-face cascade shipped with most OpenCV packages.
pub const DEFAULT_CASCADE_PATH: &str =
    "/usr/share/opencv4/haarcascades/haarcascade_frontalface_default.xml";

/// Frontal-face Haar cascade over the grayscale frame.
#[derive(Debug, Clone)]
pub struct HaarCascadeLocator {
    cascade_path: PathBuf,
    scale_factor: f64,
    min_neighbors: i32,
}

impl Default for HaarCascadeLocator {
    fn default() -> Self {
        Self::new(DEFAULT_CASCADE_PATH)
    }
}

impl HaarCascadeLocator {
    pub fn new(cascade_path: impl Into<PathBuf>) -> Self {
        Self {
            cascade_path: cascade_path.into(),
            scale_factor: 1.1,
            min_neighbors: 5,
        }
    }

    pub fn cascade_path(&self) -> &Path {
        &self.cascade_path
    }
}

fn cv_err(e: opencv::Error) -> MediaError {
    MediaError::detection_failed(format!("opencv: {}", e))
}

/// Wrap the packed RGB pixels in a Mat and convert to single-channel gray.
fn grayscale(frame: &Frame) -> MediaResult<Mat> {
    let (width, height) = frame.image.dimensions();
    if width == 0 || height == 0 {
        return Err(MediaError::detection_failed("frame is empty"));
    }

    let flat = Mat::from_slice(frame.image.as_raw().as_slice()).map_err(cv_err)?;
    let rgb = flat.reshape(3, height as i32).map_err(cv_err)?;

    let mut gray = Mat::default();
    imgproc::cvt_color(
        &*rgb,
        &mut gray,
        imgproc::COLOR_RGB2GRAY,
        0,
        core::AlgorithmHint::ALGO_HINT_DEFAULT,
    )
    .map_err(cv_err)?;
    Ok(gray)
}

impl SubjectLocator for HaarCascadeLocator {
    fn detect(&self, frame: &Frame) -> MediaResult<FaceDetection> {
        if !self.cascade_path.exists() {
            return Err(MediaError::detection_failed(format!(
                "cascade file {} not found",
                self.cascade_path.display()
            )));
        }

        let gray = grayscale(frame)?;

        let mut classifier =
            objdetect::CascadeClassifier::new(&self.cascade_path.to_string_lossy()).map_err(cv_err)?;
        let mut faces = core::Vector::<core::Rect>::new();
        classifier
            .detect_multi_scale(
                &gray,
                &mut faces,
                self.scale_factor,
                self.min_neighbors,
                0,
                core::Size::new(30, 30),
                core::Size::new(0, 0),
            )
            .map_err(cv_err)?;

        let boxes = faces
            .iter()
            .map(|r| BoundingBox::new(r.x as f64, r.y as f64, r.width as f64, r.height as f64))
            .collect();

        Ok(FaceDetection::new(boxes))
    }

    fn name(&self) -> &'static str {
        "haar_cascade"
    }
}
