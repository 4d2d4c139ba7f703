//! Render parameters.
//!
//! [`RenderParams`] is passed explicitly into `render` and the mux stage.
//! Every field has a serde default so partial JSON requests deserialize.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

use crate::segment::TransitionMode;

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum VideoAspect {
    /// 1920x1080
    #[serde(rename = "16:9")]
    Landscape,
    /// 1080x1920
    #[default]
    #[serde(rename = "9:16")]
    Portrait,
    /// 1080x1080
    #[serde(rename = "1:1")]
    Square,
}

impl VideoAspect {
    /// Output frame size `(width, height)`.
    pub fn to_resolution(&self) -> (u32, u32) {
        match self {
            VideoAspect::Landscape => (1920, 1080),
            VideoAspect::Portrait => (1080, 1920),
            VideoAspect::Square => (1080, 1080),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoAspect::Landscape => "16:9",
            VideoAspect::Portrait => "9:16",
            VideoAspect::Square => "1:1",
        }
    }
}

impl fmt::Display for VideoAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoAspect {
    type Err = AspectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" | "landscape" => Ok(VideoAspect::Landscape),
            "9:16" | "portrait" => Ok(VideoAspect::Portrait),
            "1:1" | "square" => Ok(VideoAspect::Square),
            _ => Err(AspectParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown aspect ratio: {0}")]
pub struct AspectParseError(String);

/// How the planner orders material windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConcatMode {
    /// Shuffle the candidate pool once
    #[default]
    Random,
    /// Keep material order, first window per material only
    Sequential,
}

impl ConcatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcatMode::Random => "random",
            ConcatMode::Sequential => "sequential",
        }
    }
}

impl fmt::Display for ConcatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Background music source selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BgmType {
    /// Pick a random `*.mp3` from the music directory
    #[default]
    Random,
    /// No music unless `bgm_file` is set
    #[serde(other)]
    None,
}

/// Vertical placement of subtitle overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtitlePosition {
    #[default]
    Bottom,
    Top,
    Custom,
    #[serde(other)]
    Center,
}

/// Subtitle background box: a flag or an explicit colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TextBackground {
    Enabled(bool),
    Color(String),
}

impl Default for TextBackground {
    fn default() -> Self {
        TextBackground::Enabled(true)
    }
}

impl TextBackground {
    /// Box colour to draw, if any.
    pub fn box_color(&self) -> Option<&str> {
        match self {
            TextBackground::Enabled(true) => Some("#000000"),
            TextBackground::Enabled(false) => None,
            TextBackground::Color(c) if c.trim().is_empty() => None,
            TextBackground::Color(c) => Some(c.as_str()),
        }
    }
}

/// Parameters for one render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct RenderParams {
    #[serde(default)]
    pub video_aspect: VideoAspect,

    #[serde(default)]
    pub video_concat_mode: ConcatMode,

    /// Task-global transition; segments without their own inherit it
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::segment::lenient_transition"
    )]
    #[schemars(with = "Option<String>")]
    pub video_transition_mode: Option<TransitionMode>,

    /// Maximum planned window length (seconds)
    #[serde(default = "default_clip_duration")]
    #[validate(range(min = 0.6, max = 600.0))]
    pub video_clip_duration: f64,

    #[serde(default = "default_voice_volume")]
    #[validate(range(min = 0.0, max = 10.0))]
    pub voice_volume: f64,

    #[serde(default)]
    pub bgm_type: BgmType,

    /// Explicit music file; takes precedence over `bgm_type`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgm_file: Option<String>,

    #[serde(default = "default_bgm_volume")]
    #[validate(range(min = 0.0, max = 10.0))]
    pub bgm_volume: f64,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub bgm_fade_in_sec: f64,

    #[serde(default = "default_bgm_fade_out")]
    #[validate(range(min = 0.0))]
    pub bgm_fade_out_sec: f64,

    /// Attenuate music under narration by a flat multiplier
    #[serde(default)]
    pub bgm_ducking: bool,

    #[serde(default = "default_true")]
    pub subtitle_enabled: bool,

    #[serde(default)]
    pub subtitle_position: SubtitlePosition,

    /// Percent of the free vertical space, used with `custom` placement
    #[serde(default = "default_custom_position")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub custom_position: f64,

    /// Shift applied to every subtitle item (seconds, may be negative)
    #[serde(default)]
    pub subtitle_offset: f64,

    #[serde(default = "default_font_name")]
    pub font_name: String,

    #[serde(default = "default_fore_color")]
    pub text_fore_color: String,

    #[serde(default)]
    pub text_background_color: TextBackground,

    #[serde(default = "default_font_size")]
    #[validate(range(min = 1, max = 512))]
    pub font_size: u32,

    #[serde(default = "default_stroke_color")]
    pub stroke_color: String,

    #[serde(default = "default_stroke_width")]
    #[validate(range(min = 0.0, max = 50.0))]
    pub stroke_width: f64,

    #[serde(default = "default_threads")]
    #[validate(range(min = 1, max = 64))]
    pub n_threads: u32,
}

fn default_clip_duration() -> f64 {
    5.0
}
fn default_voice_volume() -> f64 {
    1.0
}
fn default_bgm_volume() -> f64 {
    0.2
}
fn default_bgm_fade_out() -> f64 {
    3.0
}
fn default_true() -> bool {
    true
}
fn default_custom_position() -> f64 {
    70.0
}
fn default_font_name() -> String {
    "STHeitiMedium.ttc".to_string()
}
fn default_fore_color() -> String {
    "#FFFFFF".to_string()
}
fn default_font_size() -> u32 {
    60
}
fn default_stroke_color() -> String {
    "#000000".to_string()
}
fn default_stroke_width() -> f64 {
    1.5
}
fn default_threads() -> u32 {
    2
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            video_aspect: VideoAspect::default(),
            video_concat_mode: ConcatMode::default(),
            video_transition_mode: None,
            video_clip_duration: default_clip_duration(),
            voice_volume: default_voice_volume(),
            bgm_type: BgmType::default(),
            bgm_file: None,
            bgm_volume: default_bgm_volume(),
            bgm_fade_in_sec: 0.0,
            bgm_fade_out_sec: default_bgm_fade_out(),
            bgm_ducking: false,
            subtitle_enabled: true,
            subtitle_position: SubtitlePosition::default(),
            custom_position: default_custom_position(),
            subtitle_offset: 0.0,
            font_name: default_font_name(),
            text_fore_color: default_fore_color(),
            text_background_color: TextBackground::default(),
            font_size: default_font_size(),
            stroke_color: default_stroke_color(),
            stroke_width: default_stroke_width(),
            n_threads: default_threads(),
        }
    }
}

impl RenderParams {
    /// Output frame size for the configured aspect.
    pub fn resolution(&self) -> (u32, u32) {
        self.video_aspect.to_resolution()
    }

    /// Explicit music file, ignoring blank values.
    pub fn explicit_bgm_file(&self) -> Option<&str> {
        self.bgm_file
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
