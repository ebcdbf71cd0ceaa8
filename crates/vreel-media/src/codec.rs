//! Codec port: probing, frame access and encoding behind one trait.
//!
//! The compositor and reframe engine only ever describe a render as a
//! [`RenderPlan`]; executing it is the job of a [`CodecPort`]. The default
//! implementation drives the FFmpeg CLI, tests substitute an in-memory fake.

use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use vreel_models::{EncodingConfig, MediaAsset, RenderStage};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{move_file, partial_path};
use crate::probe::probe_video;
use crate::progress::ProgressCallback;

/// A decoded video frame in packed RGB.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Presentation time in seconds
    pub timestamp: f64,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp: f64) -> Self {
        Self { image, timestamp }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// One input of a render and the demuxer options that precede it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderInput {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl RenderInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Everything needed to produce one output file.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub stage: RenderStage,
    pub inputs: Vec<RenderInput>,
    pub filter_complex: String,
    /// `-map` targets, in output stream order
    pub maps: Vec<String>,
    pub encoding: EncodingConfig,
    /// Expected output duration in seconds
    pub duration: f64,
    pub output_width: u32,
    pub output_height: u32,
    /// Output frame rate
    pub fps: f64,
}

impl RenderPlan {
    /// Build the FFmpeg invocation writing to `output`.
    pub fn to_command(&self, output: &Path) -> MediaResult<FfmpegCommand> {
        let (first, rest) = self
            .inputs
            .split_first()
            .ok_or_else(|| MediaError::composition("render plan has no inputs"))?;

        let mut cmd = FfmpegCommand::new(&first.path, output).input_args(first.args.iter().cloned());
        for input in rest {
            cmd = cmd.add_input(&input.path).input_args(input.args.iter().cloned());
        }

        cmd = cmd.filter_complex(self.filter_complex.clone());
        for target in &self.maps {
            cmd = cmd.map(target.clone());
        }

        Ok(cmd.output_args(self.encoding.to_ffmpeg_args()))
    }

    /// Asset the render is expected to produce at `path`.
    pub fn expected_asset(&self, path: impl Into<PathBuf>) -> MediaAsset {
        MediaAsset::new(
            path,
            self.duration,
            self.output_width,
            self.output_height,
            self.fps,
            true,
        )
    }
}

/// Media backend used by the compositor and reframe engine.
#[async_trait]
pub trait CodecPort: Send + Sync {
    /// Read duration, dimensions, frame rate and audio presence.
    async fn probe(&self, path: &Path) -> MediaResult<MediaAsset>;

    /// Decode the frame shown at `at_secs`.
    async fn extract_frame(&self, asset: &MediaAsset, at_secs: f64) -> MediaResult<Frame>;

    /// Execute a render plan, writing exactly to `output`.
    async fn encode(
        &self,
        plan: &RenderPlan,
        output: &Path,
        progress: ProgressCallback,
    ) -> MediaResult<()>;

    fn name(&self) -> &'static str;
}

/// [`CodecPort`] backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegCodec {
    runner: FfmpegRunner,
}

impl FfmpegCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any single FFmpeg invocation running longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }
}

#[async_trait]
impl CodecPort for FfmpegCodec {
    async fn probe(&self, path: &Path) -> MediaResult<MediaAsset> {
        probe_video(path).await
    }

    async fn extract_frame(&self, asset: &MediaAsset, at_secs: f64) -> MediaResult<Frame> {
        let at = if at_secs >= 0.0 && at_secs < asset.duration {
            at_secs
        } else {
            0.0
        };

        let cmd = FfmpegCommand::new(&asset.path, "-")
            .seek(at)
            .without_progress()
            .single_frame()
            .output_args(["-f", "rawvideo", "-pix_fmt", "rgb24"]);

        let data = self.runner.run_to_stdout(&cmd).await?;
        let expected = asset.width as usize * asset.height as usize * 3;
        if data.len() < expected {
            return Err(MediaError::detection_failed(format!(
                "decoded {} bytes at {:.3}s, expected {} for {}x{}",
                data.len(),
                at,
                expected,
                asset.width,
                asset.height
            )));
        }

        let mut data = data;
        data.truncate(expected);
        let image = RgbImage::from_raw(asset.width, asset.height, data)
            .ok_or_else(|| MediaError::detection_failed("frame buffer does not match dimensions"))?;

        Ok(Frame::new(image, at))
    }

    async fn encode(
        &self,
        plan: &RenderPlan,
        output: &Path,
        progress: ProgressCallback,
    ) -> MediaResult<()> {
        let cmd = plan.to_command(output)?;
        self.runner.run_with_progress(&cmd, progress).await
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Removes a partial output on drop unless the render completed.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Failed to remove partial output");
                }
            }
        }
    }
}

/// Render `plan` to `output` through a temporary sibling file.
///
/// `output` appears only when the encode succeeded. Failures, including the
/// future being dropped, leave neither the final nor the partial file behind.
pub async fn render_plan(
    codec: &dyn CodecPort,
    plan: &RenderPlan,
    output: &Path,
    progress: ProgressCallback,
) -> MediaResult<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MediaError::resource(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
    }

    let mut partial = PartialFile {
        path: partial_path(output),
        armed: true,
    };

    let started = Instant::now();
    debug!(
        stage = plan.stage.as_str(),
        codec = codec.name(),
        inputs = plan.inputs.len(),
        output = %output.display(),
        "Starting render"
    );

    codec
        .encode(plan, &partial.path, progress)
        .await
        .map_err(|e| MediaError::encode(plan.stage, e))?;

    move_file(&partial.path, output)
        .await
        .map_err(|e| MediaError::encode(plan.stage, e))?;
    partial.armed = false;

    let elapsed = started.elapsed().as_secs_f64();
    metrics::histogram!("vreel_encode_duration_seconds", "stage" => plan.stage.as_str())
        .record(elapsed);
    info!(
        stage = plan.stage.as_str(),
        output = %output.display(),
        elapsed_secs = elapsed,
        "Render complete"
    );

    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory codec: probes answer from a table, encodes write a stub file.
    pub(crate) struct FakeCodec {
        assets: Mutex<HashMap<PathBuf, MediaAsset>>,
        frame: Option<RgbImage>,
        sampled: Mutex<Vec<f64>>,
        plans: Mutex<Vec<RenderPlan>>,
        fail_encode: bool,
    }

    impl FakeCodec {
        pub(crate) fn with_assets(assets: Vec<MediaAsset>) -> Self {
            Self {
                assets: Mutex::new(assets.into_iter().map(|a| (a.path.clone(), a)).collect()),
                frame: None,
                sampled: Mutex::new(Vec::new()),
                plans: Mutex::new(Vec::new()),
                fail_encode: false,
            }
        }

        pub(crate) fn with_frame(mut self, frame: RgbImage) -> Self {
            self.frame = Some(frame);
            self
        }

        pub(crate) fn failing(mut self) -> Self {
            self.fail_encode = true;
            self
        }

        pub(crate) fn encoded_plans(&self) -> Vec<RenderPlan> {
            self.plans.lock().unwrap().clone()
        }

        /// Timestamps passed to `extract_frame`, in call order.
        pub(crate) fn sampled_times(&self) -> Vec<f64> {
            self.sampled.lock().unwrap().clone()
        }
    }

    /// `x.part.mp4` and `x.mp4` refer to the same render.
    fn final_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().replace(".part.", "."))
            .unwrap_or_default();
        path.with_file_name(name)
    }

    #[async_trait]
    impl CodecPort for FakeCodec {
        async fn probe(&self, path: &Path) -> MediaResult<MediaAsset> {
            let assets = self.assets.lock().unwrap();
            assets
                .get(path)
                .cloned()
                .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))
        }

        async fn extract_frame(&self, _asset: &MediaAsset, at_secs: f64) -> MediaResult<Frame> {
            self.sampled.lock().unwrap().push(at_secs);
            self.frame
                .clone()
                .map(|image| Frame::new(image, at_secs))
                .ok_or_else(|| MediaError::detection_failed("no frame available"))
        }

        async fn encode(
            &self,
            plan: &RenderPlan,
            output: &Path,
            _progress: ProgressCallback,
        ) -> MediaResult<()> {
            std::fs::write(output, b"fake")?;
            if self.fail_encode {
                return Err(MediaError::ffmpeg_failed("encoder crashed", None, Some(1)));
            }
            let target = final_path(output);
            self.assets
                .lock()
                .unwrap()
                .insert(target.clone(), plan.expected_asset(target));
            self.plans.lock().unwrap().push(plan.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }
}
