//! Job definitions and per-job configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::aspect::AspectRatio;
use crate::layer::AnchorPosition;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to do when an intro or outro differs in resolution from the main segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Fail the composition
    #[default]
    Reject,
    /// Fit inside the main frame and pad with black bars
    Letterbox,
    /// Scale to the main frame ignoring aspect ratio
    Stretch,
}

/// How a music track shorter than the video is extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MusicExtension {
    /// Play once, then silence until the end
    #[default]
    SilencePad,
    /// Repeat the track from the start
    Loop,
}

/// Watermark image layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WatermarkConfig {
    /// Image file (PNG, JPEG or WebP)
    pub path: PathBuf,
    #[serde(default)]
    pub anchor: AnchorPosition,
    /// Transparent padding from the anchored edges, in pixels
    #[serde(default = "default_watermark_margin")]
    pub margin: u32,
    /// Opacity (0.0 = invisible, 1.0 = fully opaque)
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Maximum rendered width in pixels
    #[serde(default = "default_watermark_width")]
    pub max_width: u32,
}

fn default_watermark_margin() -> u32 {
    8
}
fn default_opacity() -> f32 {
    1.0
}
fn default_watermark_width() -> u32 {
    100
}

impl WatermarkConfig {
    /// Create a bottom-right watermark with default sizing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            anchor: AnchorPosition::default(),
            margin: default_watermark_margin(),
            opacity: default_opacity(),
            max_width: default_watermark_width(),
        }
    }

    /// Set anchor position.
    pub fn with_anchor(mut self, anchor: AnchorPosition) -> Self {
        self.anchor = anchor;
        self
    }

    /// Set watermark opacity, clamped to `0.0..=1.0`.
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

/// Caption text layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionConfig {
    pub text: String,
    #[serde(default = "default_font")]
    pub font: String,
    #[serde(default)]
    pub font_file: Option<PathBuf>,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_font_color")]
    pub color: String,
    #[serde(default = "default_wrap_fraction")]
    pub wrap_width_fraction: f64,
}

fn default_font() -> String {
    "Arial".to_string()
}
fn default_font_size() -> u32 {
    40
}
fn default_font_color() -> String {
    "white".to_string()
}
fn default_wrap_fraction() -> f64 {
    0.9
}

impl CaptionConfig {
    /// Create a caption with the default font settings.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font: default_font(),
            font_file: None,
            font_size: default_font_size(),
            color: default_font_color(),
            wrap_width_fraction: default_wrap_fraction(),
        }
    }
}

/// Background music track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MusicConfig {
    pub path: PathBuf,
    #[serde(default = "default_music_gain")]
    pub gain: f32,
    #[serde(default)]
    pub extension: MusicExtension,
}

fn default_music_gain() -> f32 {
    0.6
}

impl MusicConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gain: default_music_gain(),
            extension: MusicExtension::default(),
        }
    }
}

/// Layer configuration for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LayerConfig {
    #[serde(default)]
    pub intro: Option<PathBuf>,
    #[serde(default)]
    pub outro: Option<PathBuf>,
    #[serde(default)]
    pub watermark: Option<WatermarkConfig>,
    #[serde(default)]
    pub caption: Option<CaptionConfig>,
    #[serde(default)]
    pub music: Option<MusicConfig>,
    /// Gain applied to the timeline's own audio when music is mixed in
    #[serde(default = "default_original_gain")]
    pub original_gain: f32,
    #[serde(default)]
    pub resolution_policy: ResolutionPolicy,
}

fn default_original_gain() -> f32 {
    1.0
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            intro: None,
            outro: None,
            watermark: None,
            caption: None,
            music: None,
            original_gain: default_original_gain(),
            resolution_policy: ResolutionPolicy::default(),
        }
    }
}

impl LayerConfig {
    /// Validate value ranges.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.original_gain >= 0.0) {
            return Err(format!("original_gain must be >= 0, got {}", self.original_gain));
        }
        if let Some(music) = &self.music {
            if !(music.gain >= 0.0) {
                return Err(format!("music gain must be >= 0, got {}", music.gain));
            }
        }
        if let Some(watermark) = &self.watermark {
            if !(0.0..=1.0).contains(&watermark.opacity) {
                return Err(format!(
                    "watermark opacity must be within 0..=1, got {}",
                    watermark.opacity
                ));
            }
            if watermark.max_width == 0 {
                return Err("watermark max_width must be > 0".to_string());
            }
        }
        if let Some(caption) = &self.caption {
            if caption.font_size == 0 {
                return Err("caption font_size must be > 0".to_string());
            }
            if !(caption.wrap_width_fraction > 0.0 && caption.wrap_width_fraction <= 1.0) {
                return Err(format!(
                    "caption wrap_width_fraction must be within (0, 1], got {}",
                    caption.wrap_width_fraction
                ));
            }
        }
        Ok(())
    }
}

/// Reframe configuration for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReframeConfig {
    #[serde(default)]
    pub target_aspect: AspectRatio,
    /// Run the subject locator; when false the crop is centered
    #[serde(default = "default_true")]
    pub detect_subject: bool,
    /// Time of the representative frame, in seconds from the start of the
    /// main segment
    #[serde(default)]
    pub sample_time: f64,
}

fn default_true() -> bool {
    true
}

impl Default for ReframeConfig {
    fn default() -> Self {
        Self {
            target_aspect: AspectRatio::PORTRAIT,
            detect_subject: true,
            sample_time: 0.0,
        }
    }
}

impl ReframeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.sample_time >= 0.0) {
            return Err(format!("sample_time must be >= 0, got {}", self.sample_time));
        }
        Ok(())
    }
}

/// Where the source asset comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Already-downloaded local file; `id` defaults to the file stem
    Local {
        path: PathBuf,
        #[serde(default)]
        id: Option<String>,
    },
    /// Remote URL resolved through the acquisition service
    Url { url: String },
}

/// A complete job description, as read from a job file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobSpec {
    pub source: SourceSpec,
    #[serde(default)]
    pub layers: LayerConfig,
    #[serde(default)]
    pub reframe: ReframeConfig,
    pub destination_dir: PathBuf,
}

impl JobSpec {
    pub fn validate(&self) -> Result<(), String> {
        if let SourceSpec::Url { url } = &self.source {
            if url.trim().is_empty() {
                return Err("source url is empty".to_string());
            }
        }
        self.layers.validate()?;
        self.reframe.validate()
    }
}
