//! Portrait reframing.
//!
//! A landscape clip becomes a portrait one by cropping a full-height window
//! whose horizontal position follows the subject found on one representative
//! frame. The window is held fixed for the whole clip.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use vreel_models::{
    AspectRatio, CropWindow, EncodingConfig, MediaAsset, ReframeConfig, RenderStage,
};

use crate::codec::{render_plan, CodecPort, Frame, RenderInput, RenderPlan};
use crate::error::{MediaError, MediaResult};
use crate::filters::crop_filter;
use crate::progress::ProgressCallback;
use crate::subject::SubjectLocator;

/// Where the crop is centered and why.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorDecision {
    /// Horizontal crop center in source pixels
    pub anchor_x: u32,
    /// Whether the anchor came from a detected subject
    pub detected: bool,
    /// Why the fallback was used, when detection was attempted and failed
    pub degradation: Option<String>,
}

impl AnchorDecision {
    fn centered(asset: &MediaAsset) -> Self {
        Self {
            anchor_x: asset.width / 2,
            detected: false,
            degradation: None,
        }
    }

    fn degraded(asset: &MediaAsset, reason: String) -> Self {
        Self {
            degradation: Some(reason),
            ..Self::centered(asset)
        }
    }
}

/// Result of a successful reframe.
#[derive(Debug, Clone)]
pub struct ReframeOutcome {
    pub output: MediaAsset,
    pub window: CropWindow,
    pub anchor: AnchorDecision,
}

/// Full-height crop window of `target` aspect centered on `anchor_x`.
///
/// The window is shifted to stay inside the frame. Fails when the source is
/// narrower than the window.
pub fn compute_crop_window(
    source_width: u32,
    source_height: u32,
    anchor_x: u32,
    target: AspectRatio,
) -> MediaResult<CropWindow> {
    if source_width == 0 || source_height == 0 {
        return Err(MediaError::reframe(format!(
            "invalid source dimensions {}x{}",
            source_width, source_height
        )));
    }

    let crop_width = (source_height as f64 * target.as_f64()).round() as u32;
    if crop_width == 0 {
        return Err(MediaError::reframe(format!(
            "aspect {} yields an empty crop at height {}",
            target, source_height
        )));
    }
    if crop_width > source_width {
        return Err(MediaError::reframe(format!(
            "source is {}x{} but a {} crop needs {} px of width",
            source_width, source_height, target, crop_width
        )));
    }

    let x1 = anchor_x
        .saturating_sub(crop_width / 2)
        .min(source_width - crop_width);

    Ok(CropWindow::new(x1, 0, x1 + crop_width, source_height))
}

/// Crops composited clips to a portrait aspect around the detected subject.
pub struct ReframeEngine {
    codec: Arc<dyn CodecPort>,
    locator: Arc<dyn SubjectLocator>,
}

impl ReframeEngine {
    pub fn new(codec: Arc<dyn CodecPort>, locator: Arc<dyn SubjectLocator>) -> Self {
        Self { codec, locator }
    }

    pub fn locator_name(&self) -> &'static str {
        self.locator.name()
    }

    /// Horizontal subject position on `frame`, if any.
    ///
    /// Detection runs on the blocking pool.
    pub async fn locate_subject(&self, frame: Frame) -> MediaResult<Option<u32>> {
        let locator = Arc::clone(&self.locator);
        let detection = tokio::task::spawn_blocking(move || locator.detect(&frame))
            .await
            .map_err(|e| MediaError::detection_failed(format!("locator task failed: {}", e)))??;
        Ok(detection.anchor_x())
    }

    /// Pick the crop anchor for `asset`. Never fails; problems degrade to
    /// the frame center and are reported in [`AnchorDecision::degradation`].
    pub async fn choose_anchor(&self, asset: &MediaAsset, config: &ReframeConfig) -> AnchorDecision {
        self.choose_anchor_at(asset, config, 0.0).await
    }

    /// Like [`choose_anchor`](Self::choose_anchor) for a clip whose main
    /// segment starts `main_start` seconds in. The representative frame is
    /// taken at `main_start + config.sample_time`.
    pub async fn choose_anchor_at(
        &self,
        asset: &MediaAsset,
        config: &ReframeConfig,
        main_start: f64,
    ) -> AnchorDecision {
        if !config.detect_subject {
            return AnchorDecision::centered(asset);
        }

        let at_secs = main_start.max(0.0) + config.sample_time;
        let frame = match self.codec.extract_frame(asset, at_secs).await {
            Ok(frame) => frame,
            Err(e) => {
                return self.degrade(asset, format!("could not decode representative frame: {}", e))
            }
        };
        let frame_width = frame.width();

        match self.locate_subject(frame).await {
            Ok(Some(x)) => {
                // Frames may be decoded at a different size than the asset
                let anchor_x = if frame_width > 0 && frame_width != asset.width {
                    (x as u64 * asset.width as u64 / frame_width as u64) as u32
                } else {
                    x
                };
                info!(
                    locator = self.locator.name(),
                    anchor_x,
                    source_width = asset.width,
                    "Subject located"
                );
                AnchorDecision {
                    anchor_x: anchor_x.min(asset.width),
                    detected: true,
                    degradation: None,
                }
            }
            Ok(None) => self.degrade(asset, "no subject detected; centering crop".to_string()),
            Err(e) => self.degrade(
                asset,
                format!("subject locator {} failed: {}; centering crop", self.locator.name(), e),
            ),
        }
    }

    fn degrade(&self, asset: &MediaAsset, reason: String) -> AnchorDecision {
        warn!(
            locator = self.locator.name(),
            path = %asset.path.display(),
            reason = %reason,
            "Subject detection degraded"
        );
        metrics::counter!("vreel_detection_degraded_total").increment(1);
        AnchorDecision::degraded(asset, reason)
    }

    /// Render plan cropping every frame of `asset` to `window`, audio passed through.
    pub fn apply_crop(
        &self,
        asset: &MediaAsset,
        window: &CropWindow,
        encoding: &EncodingConfig,
    ) -> MediaResult<RenderPlan> {
        if !window.fits(asset.width, asset.height) {
            return Err(MediaError::reframe(format!(
                "crop window {} does not fit {}x{}",
                window, asset.width, asset.height
            )));
        }

        Ok(RenderPlan {
            stage: RenderStage::Reframe,
            inputs: vec![RenderInput::new(&asset.path)],
            filter_complex: format!("[0:v]{},format=yuv420p[vout]", crop_filter(window)),
            maps: vec!["[vout]".to_string(), "0:a?".to_string()],
            encoding: encoding.clone(),
            duration: asset.duration,
            output_width: (window.width() & !1).max(2),
            output_height: (window.height() & !1).max(2),
            fps: asset.fps,
        })
    }

    /// Fail early when `asset` is too narrow for the target aspect.
    pub fn ensure_reachable(&self, asset: &MediaAsset, config: &ReframeConfig) -> MediaResult<()> {
        compute_crop_window(asset.width, asset.height, asset.width / 2, config.target_aspect)
            .map(|_| ())
    }

    /// Detect, crop and render `asset` to `output`.
    ///
    /// A source too narrow for the target aspect fails before anything is
    /// written.
    pub async fn reframe(
        &self,
        asset: &MediaAsset,
        config: &ReframeConfig,
        output: &Path,
        encoding: &EncodingConfig,
        progress: ProgressCallback,
    ) -> MediaResult<ReframeOutcome> {
        // Reject impossible targets before spending time on detection
        self.ensure_reachable(asset, config)?;

        let anchor = self.choose_anchor(asset, config).await;
        self.render_anchored(asset, config, anchor, output, encoding, progress)
            .await
    }

    /// Crop around an already chosen anchor and render to `output`.
    pub async fn render_anchored(
        &self,
        asset: &MediaAsset,
        config: &ReframeConfig,
        anchor: AnchorDecision,
        output: &Path,
        encoding: &EncodingConfig,
        progress: ProgressCallback,
    ) -> MediaResult<ReframeOutcome> {
        let window = self
            .render_crop(asset, config, &anchor, output, encoding, progress)
            .await?;
        let rendered = self.probe_output(output).await?;

        Ok(ReframeOutcome {
            output: rendered,
            window,
            anchor,
        })
    }

    /// Render the crop around `anchor` to `output` and return the window.
    ///
    /// `output` only exists once this returns `Ok`; a failed render leaves
    /// whatever was there before untouched.
    pub async fn render_crop(
        &self,
        asset: &MediaAsset,
        config: &ReframeConfig,
        anchor: &AnchorDecision,
        output: &Path,
        encoding: &EncodingConfig,
        progress: ProgressCallback,
    ) -> MediaResult<CropWindow> {
        let window = compute_crop_window(
            asset.width,
            asset.height,
            anchor.anchor_x,
            config.target_aspect,
        )?;

        info!(
            window = %window,
            anchor_x = anchor.anchor_x,
            detected = anchor.detected,
            output = %output.display(),
            "Reframing"
        );

        let plan = self.apply_crop(asset, &window, encoding)?;
        render_plan(self.codec.as_ref(), &plan, output, progress).await?;
        Ok(window)
    }

    /// Probe a rendered reframe output.
    pub async fn probe_output(&self, output: &Path) -> MediaResult<MediaAsset> {
        self.codec
            .probe(output)
            .await
            .map_err(|e| MediaError::encode(RenderStage::Reframe, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::FakeCodec;
    use crate::progress::no_progress;
    use crate::subject::{BoundingBox, CenterLocator, FaceDetection, MockSubjectLocator};
    use image::RgbImage;
    use tempfile::TempDir;
    use vreel_models::FailureKind;

    const PORTRAIT: AspectRatio = AspectRatio::PORTRAIT;

    fn landscape(path: &str) -> MediaAsset {
        MediaAsset::new(path, 30.0, 1920, 1080, 30.0, true)
    }

    fn locator_returning(boxes: Vec<BoundingBox>) -> Arc<dyn SubjectLocator> {
        let mut locator = MockSubjectLocator::new();
        locator
            .expect_detect()
            .returning(move |_| Ok(FaceDetection::new(boxes.clone())));
        locator.expect_name().return_const("mock");
        Arc::new(locator)
    }

    #[test]
    fn test_scenario_detected_anchor() {
        let window = compute_crop_window(1920, 1080, 1060, PORTRAIT).unwrap();
        assert_eq!(window, CropWindow::new(756, 0, 1364, 1080));
    }

    #[test]
    fn test_window_clamped_to_edges() {
        let left = compute_crop_window(1920, 1080, 10, PORTRAIT).unwrap();
        assert_eq!(left, CropWindow::new(0, 0, 608, 1080));

        let right = compute_crop_window(1920, 1080, 1915, PORTRAIT).unwrap();
        assert_eq!(right, CropWindow::new(1312, 0, 1920, 1080));

        let beyond = compute_crop_window(1920, 1080, 5000, PORTRAIT).unwrap();
        assert_eq!(beyond, right);
    }

    #[test]
    fn test_window_invariants() {
        for &(w, h) in &[(1920u32, 1080u32), (1280, 720), (640, 1080), (3840, 2160), (609, 1080)] {
            for anchor in [0, w / 3, w / 2, w - 1, w + 100] {
                let window = compute_crop_window(w, h, anchor, PORTRAIT).unwrap();
                assert!(window.x1 < window.x2 && window.x2 <= w);
                assert_eq!(window.y2 - window.y1, h);
                assert!(window.fits(w, h));
                let ideal = (h as f64 * 9.0 / 16.0).round();
                assert_eq!(window.width() as f64, ideal);
                assert!((window.aspect() - 9.0 / 16.0).abs() < 1.0 / h as f64);
                assert_eq!(window, compute_crop_window(w, h, anchor, PORTRAIT).unwrap());
            }
        }
    }

    #[test]
    fn test_narrow_source_rejected() {
        let err = compute_crop_window(400, 1080, 200, PORTRAIT).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Reframe);

        // Exactly wide enough is fine
        assert!(compute_crop_window(608, 1080, 0, PORTRAIT).is_ok());
    }

    #[tokio::test]
    async fn test_anchor_from_detection() {
        let asset = landscape("/tmp/main.mp4");
        let codec = Arc::new(FakeCodec::with_assets(vec![]).with_frame(RgbImage::new(1920, 1080)));
        let engine = ReframeEngine::new(
            codec,
            locator_returning(vec![BoundingBox::new(1000.0, 300.0, 120.0, 160.0)]),
        );

        let decision = engine.choose_anchor(&asset, &ReframeConfig::default()).await;
        assert_eq!(decision.anchor_x, 1060);
        assert!(decision.detected);
        assert!(decision.degradation.is_none());
    }

    #[tokio::test]
    async fn test_frame_sampled_from_main_segment() {
        let asset = landscape("/tmp/abc_edited.mp4");
        let codec = Arc::new(FakeCodec::with_assets(vec![]).with_frame(RgbImage::new(1920, 1080)));
        let engine = ReframeEngine::new(
            codec.clone(),
            locator_returning(vec![BoundingBox::new(1000.0, 300.0, 120.0, 160.0)]),
        );

        engine.choose_anchor(&asset, &ReframeConfig::default()).await;
        let config = ReframeConfig {
            sample_time: 1.5,
            ..ReframeConfig::default()
        };
        engine.choose_anchor_at(&asset, &config, 5.0).await;

        assert_eq!(codec.sampled_times(), vec![0.0, 6.5]);
    }

    #[tokio::test]
    async fn test_anchor_rescaled_from_smaller_frame() {
        let asset = landscape("/tmp/main.mp4");
        let codec = Arc::new(FakeCodec::with_assets(vec![]).with_frame(RgbImage::new(960, 540)));
        let engine = ReframeEngine::new(
            codec,
            locator_returning(vec![BoundingBox::new(500.0, 100.0, 60.0, 60.0)]),
        );

        let decision = engine.choose_anchor(&asset, &ReframeConfig::default()).await;
        assert_eq!(decision.anchor_x, 1060);
    }

    #[tokio::test]
    async fn test_no_subject_centers_with_warning() {
        let asset = landscape("/tmp/main.mp4");
        let codec = Arc::new(FakeCodec::with_assets(vec![]).with_frame(RgbImage::new(1920, 1080)));
        let engine = ReframeEngine::new(codec, Arc::new(CenterLocator));

        let decision = engine.choose_anchor(&asset, &ReframeConfig::default()).await;
        assert_eq!(decision.anchor_x, 960);
        assert!(!decision.detected);
        assert!(decision.degradation.is_some());

        let window = compute_crop_window(1920, 1080, decision.anchor_x, PORTRAIT).unwrap();
        assert!((window.center_x() - 960.0).abs() <= 1.0);
    }

    #[tokio::test]
    async fn test_locator_error_degrades() {
        let asset = landscape("/tmp/main.mp4");
        let codec = Arc::new(FakeCodec::with_assets(vec![]).with_frame(RgbImage::new(1920, 1080)));
        let mut locator = MockSubjectLocator::new();
        locator
            .expect_detect()
            .returning(|_| Err(MediaError::detection_failed("model missing")));
        locator.expect_name().return_const("mock");
        let engine = ReframeEngine::new(codec, Arc::new(locator));

        let decision = engine.choose_anchor(&asset, &ReframeConfig::default()).await;
        assert_eq!(decision.anchor_x, 960);
        assert!(decision.degradation.unwrap().contains("model missing"));
    }

    #[tokio::test]
    async fn test_frame_failure_degrades() {
        let asset = landscape("/tmp/main.mp4");
        let codec = Arc::new(FakeCodec::with_assets(vec![]));
        let engine = ReframeEngine::new(codec, Arc::new(CenterLocator));

        let decision = engine.choose_anchor(&asset, &ReframeConfig::default()).await;
        assert_eq!(decision.anchor_x, 960);
        assert!(decision.degradation.is_some());
    }

    #[tokio::test]
    async fn test_detection_disabled_is_silent() {
        let asset = landscape("/tmp/main.mp4");
        let mut locator = MockSubjectLocator::new();
        locator.expect_detect().never();
        locator.expect_name().return_const("mock");
        let engine = ReframeEngine::new(Arc::new(FakeCodec::with_assets(vec![])), Arc::new(locator));

        let config = ReframeConfig {
            detect_subject: false,
            ..ReframeConfig::default()
        };
        let decision = engine.choose_anchor(&asset, &config).await;
        assert_eq!(decision.anchor_x, 960);
        assert!(decision.degradation.is_none());
    }

    #[test]
    fn test_apply_crop_plan() {
        let asset = landscape("/tmp/abc_edited.mp4");
        let engine = ReframeEngine::new(
            Arc::new(FakeCodec::with_assets(vec![])),
            Arc::new(CenterLocator),
        );
        let window = CropWindow::new(756, 0, 1364, 1080);

        let plan = engine
            .apply_crop(&asset, &window, &EncodingConfig::default())
            .unwrap();
        assert_eq!(plan.stage, RenderStage::Reframe);
        assert!(plan.filter_complex.starts_with("[0:v]crop=608:1080:756:0"));
        assert_eq!(plan.maps, vec!["[vout]".to_string(), "0:a?".to_string()]);
        assert_eq!((plan.output_width, plan.output_height), (608, 1080));
        assert!((plan.duration - 30.0).abs() < 1e-9);

        let outside = CropWindow::new(1500, 0, 2108, 1080);
        assert!(engine
            .apply_crop(&asset, &outside, &EncodingConfig::default())
            .is_err());
    }

    #[tokio::test]
    async fn test_reframe_narrow_source_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("abc_9x16.mp4");
        let asset = MediaAsset::new("/tmp/abc_edited.mp4", 10.0, 400, 1080, 30.0, true);
        let codec = Arc::new(FakeCodec::with_assets(vec![asset.clone()]));
        let engine = ReframeEngine::new(codec.clone(), Arc::new(CenterLocator));

        let err = engine
            .reframe(
                &asset,
                &ReframeConfig::default(),
                &output,
                &EncodingConfig::default(),
                no_progress(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Reframe);
        assert!(!output.exists());
        assert!(codec.encoded_plans().is_empty());
    }

    #[tokio::test]
    async fn test_reframe_renders_portrait() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("abc_9x16.mp4");
        let asset = landscape("/tmp/abc_edited.mp4");
        let codec = Arc::new(
            FakeCodec::with_assets(vec![asset.clone()]).with_frame(RgbImage::new(1920, 1080)),
        );
        let engine = ReframeEngine::new(
            codec,
            locator_returning(vec![BoundingBox::new(1000.0, 300.0, 120.0, 160.0)]),
        );

        let outcome = engine
            .reframe(
                &asset,
                &ReframeConfig::default(),
                &output,
                &EncodingConfig::default(),
                no_progress(),
            )
            .await
            .unwrap();

        assert!(output.exists());
        assert_eq!(outcome.window, CropWindow::new(756, 0, 1364, 1080));
        assert_eq!(outcome.output.resolution(), (608, 1080));
        assert!((outcome.output.duration - asset.duration).abs() < asset.frame_interval());
    }
}
