//! Segment planner.
//!
//! Materials are probed, sliced into windows of at most `max_clip_duration`
//! and the resulting pool is walked cyclically until the narration is
//! covered.

use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use reel_models::{ConcatMode, SegmentDescriptor, MIN_WINDOW_SECS};

use crate::backend::MediaBackend;
use crate::probe::MediaInfo;

/// A usable slice of one material.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub material: PathBuf,
    pub start: f64,
    pub end: f64,
    pub width: u32,
    pub height: u32,
}

impl Window {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Materials narrower or shorter than this, in pixels, are left out of the pool.
pub const MIN_MATERIAL_SIDE: u32 = 480;

fn is_low_resolution(info: &MediaInfo) -> bool {
    info.width < MIN_MATERIAL_SIDE || info.height < MIN_MATERIAL_SIDE
}

/// Fresh id for the segment at `order`; never reused across plans.
pub fn new_segment_id(order: u32) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("seg-{}-{}", order, &suffix[..8])
}

/// Slice one probed material into windows.
///
/// Stills yield a single window of `max_clip_duration`. Windows shorter than
/// [`MIN_WINDOW_SECS`] are discarded; `sequential` keeps only the first.
/// Materials below [`MIN_MATERIAL_SIDE`] on either side yield nothing.
pub fn material_windows(
    path: &Path,
    info: &MediaInfo,
    mode: ConcatMode,
    max_clip_duration: f64,
) -> Vec<Window> {
    let window = |start: f64, end: f64| Window {
        material: path.to_path_buf(),
        start,
        end,
        width: info.width,
        height: info.height,
    };

    if !(max_clip_duration.is_finite() && max_clip_duration >= MIN_WINDOW_SECS) {
        return Vec::new();
    }
    if is_low_resolution(info) {
        return Vec::new();
    }
    if info.is_image {
        return vec![window(0.0, max_clip_duration)];
    }

    let mut windows = Vec::new();
    let mut index = 0u32;
    loop {
        let start = index as f64 * max_clip_duration;
        if start >= info.duration {
            break;
        }
        let end = (start + max_clip_duration).min(info.duration);
        if end - start >= MIN_WINDOW_SECS {
            windows.push(window(start, end));
            if mode == ConcatMode::Sequential {
                break;
            }
        }
        index += 1;
    }
    windows
}

/// Walk `pool` cyclically, emitting descriptors until their durations sum to
/// at least `target_duration`. A non-positive or non-finite target emits one
/// pass.
pub fn emit_segments(
    pool: &[Window],
    target_duration: f64,
    max_clip_duration: f64,
) -> Vec<SegmentDescriptor> {
    let mut segments = Vec::new();
    if pool.is_empty() {
        return segments;
    }

    let bounded = target_duration.is_finite() && target_duration > 0.0;
    let mut total = 0.0;
    let mut step = 0usize;
    loop {
        let done = if bounded {
            total >= target_duration
        } else {
            step >= pool.len()
        };
        if done {
            break;
        }

        let window = &pool[step % pool.len()];
        let duration = window.duration().min(max_clip_duration);
        let order = (segments.len() + 1) as u32;
        segments.push(
            SegmentDescriptor::new(
                new_segment_id(order),
                order,
                window.material.to_string_lossy(),
                window.start,
                window.start + duration,
            )
            .with_size(window.width, window.height),
        );
        total += duration;
        step += 1;
    }
    segments
}

/// Plan a timeline covering `target_duration` seconds from `materials`.
///
/// Unreadable materials are logged and skipped; an empty result means no
/// material produced a usable window.
pub async fn plan<R: Rng + Send>(
    backend: &dyn MediaBackend,
    materials: &[PathBuf],
    target_duration: f64,
    mode: ConcatMode,
    max_clip_duration: f64,
    rng: &mut R,
) -> Vec<SegmentDescriptor> {
    let mut pool = Vec::new();
    for material in materials {
        match backend.probe(material).await {
            Ok(info) if is_low_resolution(&info) => {
                warn!(
                    path = %material.display(),
                    width = info.width,
                    height = info.height,
                    "Skipping low resolution material, minimum {}x{}",
                    MIN_MATERIAL_SIDE,
                    MIN_MATERIAL_SIDE
                );
            }
            Ok(info) => {
                let windows = material_windows(material, &info, mode, max_clip_duration);
                debug!(
                    path = %material.display(),
                    duration = info.duration,
                    windows = windows.len(),
                    "Sliced material"
                );
                pool.extend(windows);
            }
            Err(e) => {
                warn!(path = %material.display(), stage = "plan", error = %e, "Skipping unreadable material");
            }
        }
    }

    if mode == ConcatMode::Random {
        pool.shuffle(rng);
    }

    let segments = emit_segments(&pool, target_duration, max_clip_duration);
    info!(
        materials = materials.len(),
        pool = pool.len(),
        segments = segments.len(),
        target = target_duration,
        "Planned timeline"
    );
    segments
}
