//! Transition & fit: turn one segment descriptor into a baked clip file.

use rand::prelude::IndexedRandom;
use rand::Rng;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use reel_models::{EncodingConfig, FitMode, SegmentDescriptor, SlideDirection, TransitionMode};

use crate::backend::{EncodeRequest, MediaBackend};
use crate::clip::{Clip, Layer};
use crate::error::MediaError;
use crate::filters;
use crate::reaper::{HandleRegistry, Release};

/// Background behind letterboxed or centred clips.
pub const BACKGROUND_COLOR: &str = "black";

/// Zoom rate applied to still images, per second of output.
pub const STILL_ZOOM_PER_SEC: f64 = 0.03;

/// A transition resolved to a concrete effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    FadeIn { duration: f64 },
    FadeOut { duration: f64 },
    SlideIn { side: SlideDirection, duration: f64 },
    SlideOut { side: SlideDirection, duration: f64 },
}

fn random_side<R: Rng + ?Sized>(sides: &[SlideDirection], rng: &mut R) -> SlideDirection {
    sides.choose(rng).copied().unwrap_or(SlideDirection::Left)
}

fn basic_transition<R: Rng + ?Sized>(
    mode: TransitionMode,
    direction: Option<SlideDirection>,
    duration: f64,
    rng: &mut R,
) -> Option<Transition> {
    let mut side = || direction.unwrap_or_else(|| random_side(SlideDirection::ALL, rng));
    match mode {
        TransitionMode::FadeIn => Some(Transition::FadeIn { duration }),
        TransitionMode::FadeOut => Some(Transition::FadeOut { duration }),
        TransitionMode::SlideIn => Some(Transition::SlideIn {
            side: side(),
            duration,
        }),
        TransitionMode::SlideOut => Some(Transition::SlideOut {
            side: side(),
            duration,
        }),
        TransitionMode::Shuffle | TransitionMode::Mask => None,
    }
}

/// Resolve the segment's transition, falling back to `global`.
///
/// `Shuffle` picks one of the basic four per segment. `Mask` becomes a
/// slide-in: from the explicit direction, from top/bottom for a `vertical`
/// hint, from left/right for `horizontal`, and a fade-in otherwise.
pub fn resolve_transition<R: Rng + ?Sized>(
    segment: &SegmentDescriptor,
    global: Option<TransitionMode>,
    rng: &mut R,
) -> Option<Transition> {
    let mode = segment.transition.or(global)?;
    let duration = segment.effective_transition_duration();
    let direction = segment.transition_direction;

    match mode {
        TransitionMode::Shuffle => {
            let picked = TransitionMode::BASIC
                .choose(rng)
                .copied()
                .unwrap_or(TransitionMode::FadeIn);
            basic_transition(picked, direction, duration, rng)
        }
        TransitionMode::Mask => {
            let hint = segment
                .transition_mask
                .as_deref()
                .map(|m| m.trim().to_lowercase());
            let side = match (direction, hint.as_deref()) {
                (Some(side), _) => Some(side),
                (None, Some("vertical")) => Some(random_side(SlideDirection::VERTICAL, rng)),
                (None, Some("horizontal")) => Some(random_side(SlideDirection::HORIZONTAL, rng)),
                _ => None,
            };
            Some(match side {
                Some(side) => Transition::SlideIn { side, duration },
                None => Transition::FadeIn { duration },
            })
        }
        basic => basic_transition(basic, direction, duration, rng),
    }
}

/// Fit `clip` into a `width` x `height` frame.
pub fn fit_clip(clip: Clip, width: u32, height: u32, fit: FitMode) -> Clip {
    let (src_w, src_h) = clip.size();
    if (src_w, src_h) == (width, height) {
        return clip;
    }
    if src_w == 0 || src_h == 0 {
        return clip.resized(width, height);
    }
    // exact ratio equality, no tolerance
    if src_w as u64 * height as u64 == src_h as u64 * width as u64 {
        return clip.resized(width, height);
    }

    let duration = clip.duration();
    let scale_x = width as f64 / src_w as f64;
    let scale_y = height as f64 / src_h as f64;

    match fit {
        FitMode::Cover => {
            let scale = scale_x.max(scale_y);
            let new_w = ((src_w as f64 * scale).ceil() as u32).max(width);
            let new_h = ((src_h as f64 * scale).ceil() as u32).max(height);
            let scaled = clip.resized(new_w, new_h);
            let (new_w, new_h) = scaled.size();
            let (new_w, new_h) = (new_w.max(width), new_h.max(height));
            scaled.cropped(width, height, (new_w - width) / 2, (new_h - height) / 2)
        }
        FitMode::Contain => {
            let scale = scale_x.min(scale_y);
            let new_w = ((src_w as f64 * scale).round() as u32).min(width);
            let new_h = ((src_h as f64 * scale).round() as u32).min(height);
            let scaled = clip.resized(new_w, new_h);
            centred_on_background(scaled, width, height, duration)
        }
        FitMode::Center => centred_on_background(clip, width, height, duration),
    }
}

fn centred_on_background(clip: Clip, width: u32, height: u32, duration: f64) -> Clip {
    let x = (width as i64 - clip.width() as i64) / 2;
    let y = (height as i64 - clip.height() as i64) / 2;
    Clip::composite(
        width,
        height,
        duration,
        vec![
            Layer::at(Clip::color(BACKGROUND_COLOR, width, height, duration), 0, 0),
            Layer::at(clip, x, y),
        ],
    )
}

/// Apply a transition to a fitted clip whose output ends at `out_duration`.
pub fn apply_transition(clip: Clip, transition: Transition, out_duration: f64) -> Clip {
    let (width, height) = clip.size();
    let duration = clip.duration();
    let slide = |clip: Clip, (x, y): (String, String)| {
        Clip::composite(
            width,
            height,
            duration,
            vec![
                Layer::at(Clip::color(BACKGROUND_COLOR, width, height, duration), 0, 0),
                Layer::animated(clip, x, y),
            ],
        )
    };

    match transition {
        Transition::FadeIn { duration: d } => clip.with_filter(filters::fade_in(d.min(out_duration))),
        Transition::FadeOut { duration: d } => {
            let d = d.min(out_duration);
            clip.with_filter(filters::fade_out(out_duration, d))
        }
        Transition::SlideIn { side, duration: d } => {
            slide(clip, filters::slide_in_position(side, d.min(out_duration)))
        }
        Transition::SlideOut { side, duration: d } => {
            let d = d.min(out_duration);
            slide(clip, filters::slide_out_position(side, out_duration, d))
        }
    }
}

/// Stage a bake failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BakeStage {
    Open,
    Encode,
}

impl BakeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BakeStage::Open => "open",
            BakeStage::Encode => "encode",
        }
    }
}

impl fmt::Display for BakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A segment that could not be baked.
#[derive(Debug, Error)]
#[error("{stage} failed for {material}: {source}")]
pub struct BakeFailure {
    pub stage: BakeStage,
    pub material: String,
    #[source]
    pub source: MediaError,
}

/// A rendered per-segment scratch file.
#[derive(Debug, Clone, PartialEq)]
pub struct BakedClip {
    pub segment_id: String,
    pub order: u32,
    pub path: PathBuf,
    pub duration: f64,
}

/// Shared inputs for baking the segments of one render.
pub struct Baker<'a> {
    pub backend: &'a dyn MediaBackend,
    pub registry: &'a HandleRegistry,
    pub encoding: &'a EncodingConfig,
    pub width: u32,
    pub height: u32,
    pub global_transition: Option<TransitionMode>,
}

impl Baker<'_> {
    /// Build the clip graph for `segment` without encoding it.
    pub async fn build<R: Rng + Send>(
        &self,
        segment: &SegmentDescriptor,
        rng: &mut R,
    ) -> Result<Clip, BakeFailure> {
        let open_failed = |source: MediaError| BakeFailure {
            stage: BakeStage::Open,
            material: segment.material.clone(),
            source,
        };
        let material = Path::new(&segment.material);
        let info = self.backend.probe(material).await.map_err(open_failed)?;

        let mut clip = Clip::source(self.registry, material, &info)
            .subclip(segment.start, segment.end)
            .map_err(open_failed)?;
        if info.is_image {
            clip = clip.zoomed(STILL_ZOOM_PER_SEC);
        }
        let clip = clip.with_speed(segment.effective_speed());
        let clip = fit_clip(clip, self.width, self.height, segment.fit);

        let out_duration = clip.duration().min(segment.duration);
        let clip = match resolve_transition(segment, self.global_transition, rng) {
            Some(transition) => {
                debug!(segment_id = %segment.segment_id, ?transition, "Applying transition");
                apply_transition(clip, transition, out_duration)
            }
            None => clip,
        };
        Ok(clip.trimmed(segment.duration))
    }

    /// Bake `segment` into `output`.
    pub async fn bake<R: Rng + Send>(
        &self,
        segment: &SegmentDescriptor,
        output: &Path,
        rng: &mut R,
    ) -> Result<BakedClip, BakeFailure> {
        let mut clip = self.build(segment, rng).await?;
        let duration = clip.duration();
        let result = self
            .backend
            .encode(EncodeRequest::video(&clip, output, self.encoding))
            .await;
        let report = clip.release();
        debug!(
            segment_id = %segment.segment_id,
            handles = report.handles_closed,
            "Released segment clips"
        );

        result.map_err(|source| BakeFailure {
            stage: BakeStage::Encode,
            material: segment.material.clone(),
            source,
        })?;
        Ok(BakedClip {
            segment_id: segment.segment_id.clone(),
            order: segment.order,
            path: output.to_path_buf(),
            duration,
        })
    }
}
