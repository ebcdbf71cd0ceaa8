//! Layers and layer stacks.
//!
//! A [`LayerStack`] is the ordered description of one composite render:
//! the timeline segments (intro, main, outro) laid end to end, the visual
//! layers drawn over the main segment in z order, and the audio tracks mixed
//! into the output.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::asset::MediaAsset;
use crate::job::MusicExtension;

/// Position of a layer inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPosition {
    TopLeft,
    TopCenter,
    TopRight,
    Center,
    BottomLeft,
    BottomCenter,
    #[default]
    BottomRight,
}

/// Role of a timeline segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SegmentRole {
    Intro,
    Main,
    Outro,
}

impl SegmentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentRole::Intro => "intro",
            SegmentRole::Main => "main",
            SegmentRole::Outro => "outro",
        }
    }
}

/// A video segment placed on the time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimelineSegment {
    pub role: SegmentRole,
    pub asset: MediaAsset,
    /// Start time on the output timeline, in seconds
    pub start: f64,
}

impl TimelineSegment {
    /// End time on the output timeline, in seconds.
    pub fn end(&self) -> f64 {
        self.start + self.asset.duration
    }
}

/// Text rendering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextStyle {
    /// Font family name resolved through fontconfig
    pub font: String,
    /// Explicit font file, takes precedence over `font`
    pub font_file: Option<PathBuf>,
    /// Font size in pixels
    pub size: u32,
    /// Font color (name or `0xRRGGBB`)
    pub color: String,
    /// Wrap width as a fraction of the frame width
    pub wrap_width_fraction: f64,
}

/// What a visual layer draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerKind {
    /// Static image scaled to `width` x `height`
    Image {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    /// Text already wrapped into lines
    Text { lines: Vec<String>, style: TextStyle },
}

/// One visual contribution drawn over the main segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Layer {
    pub kind: LayerKind,
    /// Render order; higher values are drawn later (on top)
    pub z_order: u32,
    /// Start relative to the main segment, in seconds
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
    pub anchor: AnchorPosition,
    /// Transparent padding between the layer and the frame edge, in pixels
    pub margin: u32,
    /// Layer opacity (0.0 to 1.0)
    pub opacity: f32,
}

impl Layer {
    /// z order reserved for the base timeline.
    pub const BASE_Z: u32 = 0;
}

/// Origin of an audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AudioRole {
    /// Audio carried by the concatenated timeline
    Original,
    /// Background music
    Music,
}

/// One audio contribution to the mix: `sample = source_sample * gain`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioTrack {
    pub role: AudioRole,
    /// Source file; `None` for the timeline's own audio
    pub source: Option<PathBuf>,
    pub gain: f32,
    /// Length the track is trimmed or extended to, in seconds
    pub target_duration: f64,
    /// How a track shorter than `target_duration` is extended
    pub extension: MusicExtension,
}

/// Ordered collection of layers defining one render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LayerStack {
    segments: Vec<TimelineSegment>,
    layers: Vec<Layer>,
    audio: Vec<AudioTrack>,
}

impl LayerStack {
    /// Lay out `intro -> main -> outro` end to end.
    pub fn new(intro: Option<MediaAsset>, main: MediaAsset, outro: Option<MediaAsset>) -> Self {
        let mut segments = Vec::with_capacity(3);
        let mut cursor = 0.0;

        let ordered = [
            intro.map(|a| (SegmentRole::Intro, a)),
            Some((SegmentRole::Main, main)),
            outro.map(|a| (SegmentRole::Outro, a)),
        ];

        for (role, asset) in ordered.into_iter().flatten() {
            let duration = asset.duration;
            segments.push(TimelineSegment {
                role,
                asset,
                start: cursor,
            });
            cursor += duration;
        }

        Self {
            segments,
            layers: Vec::new(),
            audio: Vec::new(),
        }
    }

    /// Timeline segments in temporal order.
    pub fn segments(&self) -> &[TimelineSegment] {
        &self.segments
    }

    /// Index of the main segment within [`segments`](Self::segments).
    pub fn main_index(&self) -> usize {
        self.segments
            .iter()
            .position(|s| s.role == SegmentRole::Main)
            .unwrap_or(0)
    }

    /// The main segment.
    pub fn main(&self) -> &TimelineSegment {
        &self.segments[self.main_index()]
    }

    /// Start of the main segment on the output timeline, in seconds.
    pub fn main_start(&self) -> f64 {
        self.main().start
    }

    /// Sum of every segment's duration.
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.asset.duration).sum()
    }

    /// Whether any segment carries its own audio.
    pub fn has_base_audio(&self) -> bool {
        self.segments.iter().any(|s| s.asset.has_audio)
    }

    /// Visual layers, lowest z first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Insert a layer, keeping z order ascending and insertion order among equals.
    pub fn push_layer(&mut self, layer: Layer) {
        let idx = self
            .layers
            .iter()
            .position(|l| l.z_order > layer.z_order)
            .unwrap_or(self.layers.len());
        self.layers.insert(idx, layer);
    }

    /// Next free z order above every existing layer.
    pub fn next_z(&self) -> u32 {
        self.layers
            .iter()
            .map(|l| l.z_order)
            .max()
            .unwrap_or(Layer::BASE_Z)
            + 1
    }

    /// Audio tracks to mix.
    pub fn audio(&self) -> &[AudioTrack] {
        &self.audio
    }

    /// Replace the audio mix.
    pub fn set_audio(&mut self, tracks: Vec<AudioTrack>) {
        self.audio = tracks;
    }
}
