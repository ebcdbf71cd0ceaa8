//! Layer compositor.
//!
//! Builds a [`LayerStack`] (intro, main and outro segments plus the layers
//! drawn over the main segment) and renders it through a [`CodecPort`] as a
//! single FFmpeg filter graph:
//!
//! 1. Every segment is normalized to the main segment's frame size, frame
//!    rate and pixel format.
//! 2. Visual layers are drawn over the main segment only, lowest z first.
//! 3. Segments are concatenated with their audio (silence where a segment
//!    has none).
//! 4. The concatenated audio is mixed with the music track.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use vreel_models::{
    asset::DEFAULT_FPS, AudioRole, AudioTrack, CaptionConfig, EncodingConfig, Layer, LayerKind,
    LayerStack, MediaAsset, MusicConfig, MusicExtension, RenderStage, ResolutionPolicy,
    SegmentRole, TextStyle, WatermarkConfig,
};

use crate::codec::{render_plan, CodecPort, RenderInput, RenderPlan};
use crate::error::{MediaError, MediaResult};
use crate::filters::{
    audio_format, drawtext_chain, enable_window, overlay_position, overlay_source, silence,
    wrap_caption,
};
use crate::progress::ProgressCallback;

/// Caption block distance from the bottom edge, as a fraction of the font size.
const CAPTION_MARGIN_FACTOR: f64 = 0.3;

/// Composes intro, main, outro and overlays into one artifact.
pub struct LayerCompositor {
    codec: Arc<dyn CodecPort>,
    policy: ResolutionPolicy,
    stack: Option<LayerStack>,
}

impl LayerCompositor {
    pub fn new(codec: Arc<dyn CodecPort>) -> Self {
        Self {
            codec,
            policy: ResolutionPolicy::default(),
            stack: None,
        }
    }

    /// How intro/outro segments with a different frame size are handled.
    pub fn with_resolution_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The stack built so far.
    pub fn stack(&self) -> Option<&LayerStack> {
        self.stack.as_ref()
    }

    fn stack_mut(&mut self) -> MediaResult<&mut LayerStack> {
        self.stack
            .as_mut()
            .ok_or_else(|| MediaError::composition("timeline has not been built"))
    }

    fn built(&self) -> MediaResult<&LayerStack> {
        self.stack
            .as_ref()
            .ok_or_else(|| MediaError::composition("timeline has not been built"))
    }

    /// Lay out `intro -> main -> outro` and reset layers and audio.
    ///
    /// The timeline's audio defaults to the segments' own audio at unit gain.
    pub async fn build_timeline(
        &mut self,
        intro: Option<&Path>,
        main: &Path,
        outro: Option<&Path>,
    ) -> MediaResult<&LayerStack> {
        let main_asset = self.codec.probe(main).await.map_err(|e| {
            MediaError::composition(format!("main segment {} is unreadable: {}", main.display(), e))
        })?;

        let intro_asset = match intro {
            Some(path) => Some(self.probe_segment(path, SegmentRole::Intro, &main_asset).await?),
            None => None,
        };
        let outro_asset = match outro {
            Some(path) => Some(self.probe_segment(path, SegmentRole::Outro, &main_asset).await?),
            None => None,
        };

        let mut stack = LayerStack::new(intro_asset, main_asset, outro_asset);
        if stack.has_base_audio() {
            stack.set_audio(vec![original_track(1.0, stack.total_duration())]);
        }

        info!(
            segments = stack.segments().len(),
            duration_secs = stack.total_duration(),
            has_audio = stack.has_base_audio(),
            "Timeline built"
        );

        Ok(self.stack.insert(stack))
    }

    async fn probe_segment(
        &self,
        path: &Path,
        role: SegmentRole,
        main: &MediaAsset,
    ) -> MediaResult<MediaAsset> {
        let asset = self.codec.probe(path).await.map_err(|e| {
            MediaError::composition(format!(
                "{} segment {} is unreadable: {}",
                role.as_str(),
                path.display(),
                e
            ))
        })?;

        if !asset.same_resolution(main) && self.policy == ResolutionPolicy::Reject {
            return Err(MediaError::composition(format!(
                "{} segment is {}x{} but main is {}x{}",
                role.as_str(),
                asset.width,
                asset.height,
                main.width,
                main.height
            )));
        }

        Ok(asset)
    }

    /// Add a watermark image over the main segment. `None` leaves the stack unchanged.
    pub fn add_overlay(&mut self, watermark: Option<&WatermarkConfig>) -> MediaResult<()> {
        let Some(watermark) = watermark else {
            return Ok(());
        };
        let stack = self.stack_mut()?;

        let path = &watermark.path;
        if !path.exists() {
            return Err(MediaError::composition(format!(
                "watermark image {} not found",
                path.display()
            )));
        }
        let (image_width, image_height) = image::image_dimensions(path).map_err(|e| {
            MediaError::composition(format!(
                "watermark image {} is invalid: {}",
                path.display(),
                e
            ))
        })?;
        if image_width == 0 || image_height == 0 {
            return Err(MediaError::composition(format!(
                "watermark image {} is empty",
                path.display()
            )));
        }

        let width = image_width.min(watermark.max_width);
        let height = ((image_height as f64 * width as f64 / image_width as f64).round() as u32).max(1);

        let duration = stack.main().asset.duration;
        let z_order = stack.next_z();
        stack.push_layer(Layer {
            kind: LayerKind::Image {
                path: path.clone(),
                width,
                height,
            },
            z_order,
            start: 0.0,
            duration,
            anchor: watermark.anchor,
            margin: watermark.margin,
            opacity: watermark.opacity.clamp(0.0, 1.0),
        });

        debug!(path = %path.display(), width, height, z_order, "Watermark layer added");
        Ok(())
    }

    /// Add a bottom-centered caption over the main segment.
    ///
    /// Absent or blank text leaves the stack unchanged.
    pub fn add_caption(&mut self, caption: Option<&CaptionConfig>) -> MediaResult<()> {
        let Some(caption) = caption else {
            return Ok(());
        };
        if caption.text.trim().is_empty() {
            return Ok(());
        }
        let stack = self.stack_mut()?;

        let main = &stack.main().asset;
        let wrap_px = (main.width as f64 * caption.wrap_width_fraction).round() as u32;
        let lines = wrap_caption(&caption.text, caption.font_size, wrap_px);
        let duration = main.duration;

        let style = TextStyle {
            font: caption.font.clone(),
            font_file: caption.font_file.clone(),
            size: caption.font_size,
            color: caption.color.clone(),
            wrap_width_fraction: caption.wrap_width_fraction,
        };
        let margin = (caption.font_size as f64 * CAPTION_MARGIN_FACTOR).round() as u32;
        let z_order = stack.next_z();

        debug!(lines = lines.len(), wrap_px, z_order, "Caption layer added");
        stack.push_layer(Layer {
            kind: LayerKind::Text { lines, style },
            z_order,
            start: 0.0,
            duration,
            anchor: vreel_models::AnchorPosition::BottomCenter,
            margin,
            opacity: 1.0,
        });
        Ok(())
    }

    /// Configure the audio mix.
    ///
    /// With base audio the output is `original * original_gain + music * gain`;
    /// without it the music alone (still scaled by its gain). Music is trimmed
    /// or extended to the timeline duration.
    pub fn mix_audio(&mut self, music: Option<&MusicConfig>, original_gain: f32) -> MediaResult<()> {
        let stack = self.stack_mut()?;
        let total = stack.total_duration();

        let mut tracks = Vec::with_capacity(2);
        if stack.has_base_audio() {
            tracks.push(original_track(original_gain.max(0.0), total));
        }

        if let Some(music) = music {
            if !music.path.exists() {
                return Err(MediaError::composition(format!(
                    "music track {} not found",
                    music.path.display()
                )));
            }
            tracks.push(AudioTrack {
                role: AudioRole::Music,
                source: Some(music.path.clone()),
                gain: music.gain.max(0.0),
                target_duration: total,
                extension: music.extension,
            });
        }

        stack.set_audio(tracks);
        Ok(())
    }

    /// Build the render plan for the current stack.
    pub fn plan(&self, encoding: &EncodingConfig) -> MediaResult<RenderPlan> {
        let stack = self.built()?;
        let segments = stack.segments();
        let main_index = stack.main_index();
        let main = &stack.main().asset;

        let (width, height) = composed_resolution(main);
        let fps = if main.fps > 0.0 { main.fps } else { DEFAULT_FPS };
        let total = stack.total_duration();

        let mut inputs = Vec::new();
        let mut graph: Vec<String> = Vec::new();
        let mut video_labels = Vec::with_capacity(segments.len());

        for (i, segment) in segments.iter().enumerate() {
            inputs.push(RenderInput::new(&segment.asset.path));
            let scale = self.segment_scale(&segment.asset, main, width, height)?;
            graph.push(format!(
                "[{}:v]{},setsar=1,fps={},format=yuv420p[v{}]",
                i, scale, fps, i
            ));
            video_labels.push(format!("v{}", i));
        }

        // Layers over the main segment, lowest z first
        let main_duration = main.duration;
        let mut current = video_labels[main_index].clone();
        for (j, layer) in stack.layers().iter().enumerate() {
            let enable = enable_window(layer.start, layer.duration, main_duration);
            match &layer.kind {
                LayerKind::Image {
                    path,
                    width: w,
                    height: h,
                } => {
                    let input = inputs.len();
                    inputs.push(RenderInput::new(path).with_args(["-loop", "1"]));
                    graph.push(format!(
                        "[{}:v]{}[wm{}]",
                        input,
                        overlay_source(*w, *h, layer.opacity),
                        j
                    ));
                    let (x, y) = overlay_position(layer.anchor, layer.margin);
                    let mut overlay = format!(
                        "[{}][wm{}]overlay=x={}:y={}:shortest=1:format=auto",
                        current, j, x, y
                    );
                    if let Some(enable) = &enable {
                        overlay.push(':');
                        overlay.push_str(enable);
                    }
                    graph.push(format!("{}[lay{}]", overlay, j));
                }
                LayerKind::Text { lines, style } => {
                    if lines.is_empty() {
                        continue;
                    }
                    graph.push(format!(
                        "[{}]{}[lay{}]",
                        current,
                        drawtext_chain(
                            lines,
                            style,
                            layer.anchor,
                            layer.margin,
                            layer.opacity,
                            enable.as_deref()
                        ),
                        j
                    ));
                }
            }
            current = format!("lay{}", j);
        }
        video_labels[main_index] = current;

        // Concat, carrying audio when any segment has some
        let base_audio = stack.has_base_audio();
        let mut concat_inputs = String::new();
        for (i, segment) in segments.iter().enumerate() {
            concat_inputs.push_str(&format!("[{}]", video_labels[i]));
            if base_audio {
                let duration = segment.asset.duration;
                if segment.asset.has_audio {
                    graph.push(format!(
                        "[{}:a]{},apad,atrim=duration={:.3},asetpts=N/SR/TB[a{}]",
                        i,
                        audio_format(),
                        duration,
                        i
                    ));
                } else {
                    graph.push(format!("{}[a{}]", silence(duration), i));
                }
                concat_inputs.push_str(&format!("[a{}]", i));
            }
        }
        if base_audio {
            graph.push(format!(
                "{}concat=n={}:v=1:a=1[vcat][acat]",
                concat_inputs,
                segments.len()
            ));
        } else {
            graph.push(format!("{}concat=n={}:v=1:a=0[vcat]", concat_inputs, segments.len()));
        }

        let audio_label = self.push_audio_mix(stack, base_audio, total, &mut inputs, &mut graph);

        Ok(RenderPlan {
            stage: RenderStage::Compose,
            inputs,
            filter_complex: graph.join(";"),
            maps: vec!["[vcat]".to_string(), format!("[{}]", audio_label)],
            encoding: encoding.clone(),
            duration: total,
            output_width: width,
            output_height: height,
            fps,
        })
    }

    fn segment_scale(
        &self,
        asset: &MediaAsset,
        main: &MediaAsset,
        width: u32,
        height: u32,
    ) -> MediaResult<String> {
        if asset.same_resolution(main) {
            return Ok(format!("scale={}:{}", width, height));
        }
        match self.policy {
            ResolutionPolicy::Reject => Err(MediaError::composition(format!(
                "segment {} is {}x{} but main is {}x{}",
                asset.path.display(),
                asset.width,
                asset.height,
                main.width,
                main.height
            ))),
            ResolutionPolicy::Letterbox => Ok(format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black",
                w = width,
                h = height
            )),
            ResolutionPolicy::Stretch => Ok(format!("scale={}:{}", width, height)),
        }
    }

    /// Append the mixing chain and return the label holding the final audio.
    fn push_audio_mix(
        &self,
        stack: &LayerStack,
        base_audio: bool,
        total: f64,
        inputs: &mut Vec<RenderInput>,
        graph: &mut Vec<String>,
    ) -> String {
        let original = stack
            .audio()
            .iter()
            .find(|t| t.role == AudioRole::Original)
            .filter(|_| base_audio);
        let music = stack
            .audio()
            .iter()
            .find(|t| t.role == AudioRole::Music)
            .and_then(|t| t.source.as_ref().map(|path| (t, path)));

        let music_chain = |label: &str, inputs: &mut Vec<RenderInput>, graph: &mut Vec<String>| {
            if let Some((track, path)) = music {
                let index = inputs.len();
                let (input, pad) = match track.extension {
                    MusicExtension::Loop => (
                        RenderInput::new(path).with_args(["-stream_loop", "-1"]),
                        "",
                    ),
                    MusicExtension::SilencePad => (RenderInput::new(path), ",apad"),
                };
                inputs.push(input);
                graph.push(format!(
                    "[{}:a]{},volume={:.3}{},atrim=duration={:.3},asetpts=N/SR/TB[{}]",
                    index,
                    audio_format(),
                    track.gain,
                    pad,
                    total,
                    label
                ));
            }
        };

        match (original, music.is_some()) {
            (Some(original), true) => {
                graph.push(format!("[acat]volume={:.3}[aorig]", original.gain));
                music_chain("amusic", inputs, graph);
                graph.push(
                    "[aorig][amusic]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[aout]"
                        .to_string(),
                );
                "aout".to_string()
            }
            (None, true) => {
                music_chain("aout", inputs, graph);
                "aout".to_string()
            }
            (Some(original), false) => {
                if (original.gain - 1.0).abs() < f32::EPSILON {
                    "acat".to_string()
                } else {
                    graph.push(format!("[acat]volume={:.3}[aout]", original.gain));
                    "aout".to_string()
                }
            }
            (None, false) => {
                graph.push(format!("{}[aout]", silence(total)));
                "aout".to_string()
            }
        }
    }

    /// Render the stack to `output` and probe the result.
    pub async fn render(
        &self,
        output: &Path,
        encoding: &EncodingConfig,
        progress: ProgressCallback,
    ) -> MediaResult<MediaAsset> {
        let plan = self.plan(encoding)?;
        info!(
            output = %output.display(),
            inputs = plan.inputs.len(),
            duration_secs = plan.duration,
            "Rendering composition"
        );

        render_plan(self.codec.as_ref(), &plan, output, progress).await?;

        self.codec
            .probe(output)
            .await
            .map_err(|e| MediaError::encode(RenderStage::Compose, e))
    }
}

fn original_track(gain: f32, total: f64) -> AudioTrack {
    AudioTrack {
        role: AudioRole::Original,
        source: None,
        gain,
        target_duration: total,
        extension: MusicExtension::SilencePad,
    }
}

/// Frame size of a composite whose main segment is `main`.
///
/// Both sides are rounded down to even values for yuv420p.
pub fn composed_resolution(main: &MediaAsset) -> (u32, u32) {
    (even(main.width), even(main.height))
}

/// Largest even value not above `v` (at least 2).
fn even(v: u32) -> u32 {
    (v & !1).max(2)
}
