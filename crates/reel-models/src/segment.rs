//! Segment timeline models.
//!
//! A [`SegmentDescriptor`] is one planned slice of the output timeline. The
//! persisted timeline (`segments.json`) is a JSON array of descriptors; it is
//! validated once on load via [`SegmentDescriptor::validate`] and never probed
//! field-by-field afterwards.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lower bound for playback speed.
pub const MIN_SPEED: f64 = 0.75;
/// Upper bound for playback speed.
pub const MAX_SPEED: f64 = 1.25;
/// Lower bound for transition duration (seconds).
pub const MIN_TRANSITION_SECS: f64 = 0.2;
/// Upper bound for transition duration (seconds).
pub const MAX_TRANSITION_SECS: f64 = 2.0;
/// Transition duration used when a segment does not set one.
pub const DEFAULT_TRANSITION_SECS: f64 = 1.0;
/// Windows shorter than this are never planned.
pub const MIN_WINDOW_SECS: f64 = 0.6;

/// Strategy for reconciling a clip's aspect ratio with the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Scale to fit inside the frame, letterbox/pillarbox the rest
    #[default]
    Contain,
    /// Scale to cover the frame, crop the overflow
    Cover,
    /// No scaling, centered over a solid background
    Center,
}

impl FitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitMode::Contain => "contain",
            FitMode::Cover => "cover",
            FitMode::Center => "center",
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for FitMode {
    /// Unknown fit names fall back to `contain`.
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "cover" => FitMode::Cover,
            "center" => FitMode::Center,
            _ => FitMode::Contain,
        }
    }
}

impl<'de> Deserialize<'de> for FitMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().map(FitMode::from).unwrap_or_default())
    }
}

/// Transition applied to a baked segment.
///
/// Wire names follow the timeline format (`FadeIn`, `SlideOut`, ...); the
/// snake_case spellings are accepted on input as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
pub enum TransitionMode {
    /// Pick one of the four basic transitions at random per segment
    Shuffle,
    FadeIn,
    FadeOut,
    SlideIn,
    SlideOut,
    /// Mask transitions, approximated by slide or fade
    Mask,
}

impl TransitionMode {
    /// The transitions `Shuffle` chooses from.
    pub const BASIC: &'static [TransitionMode] = &[
        TransitionMode::FadeIn,
        TransitionMode::FadeOut,
        TransitionMode::SlideIn,
        TransitionMode::SlideOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionMode::Shuffle => "Shuffle",
            TransitionMode::FadeIn => "FadeIn",
            TransitionMode::FadeOut => "FadeOut",
            TransitionMode::SlideIn => "SlideIn",
            TransitionMode::SlideOut => "SlideOut",
            TransitionMode::Mask => "Mask",
        }
    }

    /// Parse a transition name, returning `None` for "no transition" and for
    /// names this engine does not know.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl fmt::Display for TransitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionMode {
    type Err = TransitionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "shuffle" => Ok(TransitionMode::Shuffle),
            "fadein" => Ok(TransitionMode::FadeIn),
            "fadeout" => Ok(TransitionMode::FadeOut),
            "slidein" => Ok(TransitionMode::SlideIn),
            "slideout" => Ok(TransitionMode::SlideOut),
            "mask" => Ok(TransitionMode::Mask),
            _ => Err(TransitionParseError(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for TransitionMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error)]
#[error("Unknown transition: {0}")]
pub struct TransitionParseError(String);

/// Side a slide transition enters from or exits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SlideDirection {
    Left,
    Right,
    Top,
    Bottom,
}

impl SlideDirection {
    pub const ALL: &'static [SlideDirection] = &[
        SlideDirection::Left,
        SlideDirection::Right,
        SlideDirection::Top,
        SlideDirection::Bottom,
    ];
    pub const VERTICAL: &'static [SlideDirection] = &[SlideDirection::Top, SlideDirection::Bottom];
    pub const HORIZONTAL: &'static [SlideDirection] =
        &[SlideDirection::Left, SlideDirection::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlideDirection::Left => "left",
            SlideDirection::Right => "right",
            SlideDirection::Top => "top",
            SlideDirection::Bottom => "bottom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "left" => Some(SlideDirection::Left),
            "right" => Some(SlideDirection::Right),
            "top" => Some(SlideDirection::Top),
            "bottom" => Some(SlideDirection::Bottom),
            _ => None,
        }
    }
}

impl fmt::Display for SlideDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned slice of the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentDescriptor {
    /// Stable id, unique within a task and never reused across re-plans
    pub segment_id: String,

    /// 1-based timeline position
    pub order: u32,

    #[serde(default)]
    pub scene_title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shot_no: Option<u32>,

    #[serde(default)]
    pub shot_desc: String,

    #[serde(default)]
    pub style: String,

    /// Declared duration on the output timeline (seconds)
    pub duration: f64,

    /// Transition name; absent means inherit the task-global setting.
    /// Unknown names deserialize to absent.
    #[serde(default, deserialize_with = "lenient_transition")]
    #[schemars(with = "Option<String>")]
    pub transition: Option<TransitionMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_duration: Option<f64>,

    /// Unknown sides deserialize to absent (random side at bake time).
    #[serde(default, deserialize_with = "lenient_direction")]
    #[schemars(with = "Option<String>")]
    pub transition_direction: Option<SlideDirection>,

    /// Mask hint for `Mask` transitions (`vertical`, `horizontal`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_mask: Option<String>,

    #[serde(default = "default_speed")]
    pub speed: f64,

    #[serde(default)]
    #[schemars(with = "String")]
    pub fit: FitMode,

    /// Source material path
    pub material: String,

    /// In-point within the source (seconds)
    pub start: f64,

    /// Out-point within the source (seconds)
    pub end: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

fn default_speed() -> f64 {
    1.0
}

pub(crate) fn lenient_transition<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<TransitionMode>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(TransitionMode::parse_lenient))
}

fn lenient_direction<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SlideDirection>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(SlideDirection::parse))
}

impl SegmentDescriptor {
    /// Create a descriptor covering `[start, end)` of `material`.
    pub fn new(
        segment_id: impl Into<String>,
        order: u32,
        material: impl Into<String>,
        start: f64,
        end: f64,
    ) -> Self {
        Self {
            segment_id: segment_id.into(),
            order,
            scene_title: String::new(),
            shot_no: None,
            shot_desc: String::new(),
            style: String::new(),
            duration: end - start,
            transition: None,
            transition_duration: None,
            transition_direction: None,
            transition_mask: None,
            speed: 1.0,
            fit: FitMode::Contain,
            material: material.into(),
            start,
            end,
            width: None,
            height: None,
        }
    }

    /// Set source dimension hints.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_fit(mut self, fit: FitMode) -> Self {
        self.fit = fit;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_transition(mut self, transition: TransitionMode) -> Self {
        self.transition = Some(transition);
        self
    }

    /// Playback speed clamped to `[MIN_SPEED, MAX_SPEED]`.
    pub fn effective_speed(&self) -> f64 {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return 1.0;
        }
        self.speed.clamp(MIN_SPEED, MAX_SPEED)
    }

    /// Transition duration clamped to `[MIN_TRANSITION_SECS, MAX_TRANSITION_SECS]`.
    pub fn effective_transition_duration(&self) -> f64 {
        self.transition_duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(DEFAULT_TRANSITION_SECS)
            .clamp(MIN_TRANSITION_SECS, MAX_TRANSITION_SECS)
    }

    /// Length of the source range before any speed change.
    pub fn source_span(&self) -> f64 {
        self.end - self.start
    }

    /// Check the structural invariants of a descriptor.
    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.segment_id.trim().is_empty() {
            return Err(SegmentError::MissingId);
        }
        if self.order == 0 {
            return Err(SegmentError::InvalidOrder(self.segment_id.clone()));
        }
        if self.material.trim().is_empty() {
            return Err(SegmentError::MissingMaterial(self.segment_id.clone()));
        }
        if !self.start.is_finite() || !self.end.is_finite() || self.start < 0.0 {
            return Err(SegmentError::InvalidRange {
                segment_id: self.segment_id.clone(),
                start: self.start,
                end: self.end,
            });
        }
        if self.end <= self.start {
            return Err(SegmentError::InvalidRange {
                segment_id: self.segment_id.clone(),
                start: self.start,
                end: self.end,
            });
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(SegmentError::InvalidDuration(self.segment_id.clone()));
        }
        Ok(())
    }
}

/// Validate a timeline and return it sorted by `order`.
pub fn validate_timeline(
    mut segments: Vec<SegmentDescriptor>,
) -> Result<Vec<SegmentDescriptor>, SegmentError> {
    let mut seen = HashSet::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        segment.validate().map_err(|e| SegmentError::AtIndex {
            index,
            source: Box::new(e),
        })?;
        if !seen.insert(segment.segment_id.as_str()) {
            return Err(SegmentError::AtIndex {
                index,
                source: Box::new(SegmentError::DuplicateId(segment.segment_id.clone())),
            });
        }
    }
    segments.sort_by_key(|s| s.order);
    Ok(segments)
}

/// Sum of declared durations, rounded to milliseconds.
pub fn total_duration(segments: &[SegmentDescriptor]) -> f64 {
    let sum: f64 = segments.iter().map(|s| s.duration).sum();
    (sum * 1000.0).round() / 1000.0
}

/// Segment validation error.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Segment id is empty")]
    MissingId,

    #[error("Segment {0}: order must be 1-based")]
    InvalidOrder(String),

    #[error("Segment {0}: material path is empty")]
    MissingMaterial(String),

    #[error("Segment {segment_id}: invalid source range [{start}, {end})")]
    InvalidRange {
        segment_id: String,
        start: f64,
        end: f64,
    },

    #[error("Segment {0}: duration must be positive")]
    InvalidDuration(String),

    #[error("Segment id {0} appears more than once")]
    DuplicateId(String),

    #[error("Segment at index {index}: {source}")]
    AtIndex {
        index: usize,
        #[source]
        source: Box<SegmentError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_timeline_entry() {
        let json = r#"{
            "segment_id": "s1",
            "order": 1,
            "scene_title": "opening",
            "shot_no": 1,
            "duration": 1.5,
            "transition": "FadeIn",
            "speed": 1.0,
            "fit": "cover",
            "material": "/path/material1.mp4",
            "start": 0,
            "end": 1.5,
            "width": 1920,
            "height": 1080
        }"#;
        let seg: SegmentDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(seg.transition, Some(TransitionMode::FadeIn));
        assert_eq!(seg.fit, FitMode::Cover);
        assert_eq!(seg.shot_no, Some(1));
        assert!(seg.validate().is_ok());
    }

    #[test]
    fn test_unknown_names_are_lenient() {
        let json = r#"{
            "segment_id": "s1", "order": 1, "duration": 2.0,
            "transition": "Spiral", "transition_direction": "diagonal",
            "fit": "stretch", "material": "a.mp4", "start": 0, "end": 2
        }"#;
        let seg: SegmentDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(seg.transition, None);
        assert_eq!(seg.transition_direction, None);
        assert_eq!(seg.fit, FitMode::Contain);
    }

    #[test]
    fn test_transition_aliases() {
        assert_eq!("fade_in".parse::<TransitionMode>().unwrap(), TransitionMode::FadeIn);
        assert_eq!("SlideOut".parse::<TransitionMode>().unwrap(), TransitionMode::SlideOut);
        assert_eq!("slide-in".parse::<TransitionMode>().unwrap(), TransitionMode::SlideIn);
        assert!("none".parse::<TransitionMode>().is_err());
    }

    #[test]
    fn test_speed_and_transition_clamps() {
        let seg = SegmentDescriptor::new("s", 1, "a.mp4", 0.0, 4.0).with_speed(3.0);
        assert_eq!(seg.effective_speed(), MAX_SPEED);
        let seg = seg.with_speed(0.1);
        assert_eq!(seg.effective_speed(), MIN_SPEED);

        let mut seg = SegmentDescriptor::new("s", 1, "a.mp4", 0.0, 4.0);
        assert_eq!(seg.effective_transition_duration(), DEFAULT_TRANSITION_SECS);
        seg.transition_duration = Some(0.05);
        assert_eq!(seg.effective_transition_duration(), MIN_TRANSITION_SECS);
        seg.transition_duration = Some(9.0);
        assert_eq!(seg.effective_transition_duration(), MAX_TRANSITION_SECS);
    }

    #[test]
    fn test_validate_rejects_bad_range() {
        let seg = SegmentDescriptor::new("s", 1, "a.mp4", 3.0, 3.0);
        assert!(matches!(seg.validate(), Err(SegmentError::InvalidRange { .. })));

        let err = validate_timeline(vec![
            SegmentDescriptor::new("a", 1, "a.mp4", 0.0, 1.0),
            SegmentDescriptor::new("b", 2, "", 0.0, 1.0),
        ])
        .unwrap_err();
        assert!(matches!(err, SegmentError::AtIndex { index: 1, .. }));
    }

    #[test]
    fn test_validate_timeline_sorts_by_order() {
        let sorted = validate_timeline(vec![
            SegmentDescriptor::new("b", 2, "a.mp4", 0.0, 1.0),
            SegmentDescriptor::new("a", 1, "a.mp4", 1.0, 2.0),
        ])
        .unwrap();
        assert_eq!(sorted[0].segment_id, "a");
    }

    #[test]
    fn test_validate_timeline_rejects_duplicate_ids() {
        let err = validate_timeline(vec![
            SegmentDescriptor::new("a", 1, "a.mp4", 0.0, 1.0),
            SegmentDescriptor::new("b", 2, "a.mp4", 1.0, 2.0),
            SegmentDescriptor::new("a", 3, "b.mp4", 0.0, 1.0),
        ])
        .unwrap_err();
        match err {
            SegmentError::AtIndex { index, source } => {
                assert_eq!(index, 2);
                assert!(matches!(*source, SegmentError::DuplicateId(ref id) if id == "a"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_total_duration_rounds() {
        let segs = vec![
            SegmentDescriptor::new("a", 1, "a.mp4", 0.0, 1.0001),
            SegmentDescriptor::new("b", 2, "a.mp4", 0.0, 2.0),
        ];
        assert_eq!(total_duration(&segs), 3.0);
    }
}
