//! Engine metrics.
//!
//! Recorded through the `metrics` facade; the worker binary installs the
//! Prometheus exporter.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Segments baked successfully.
    pub const SEGMENTS_BAKED_TOTAL: &str = "reel_segments_baked_total";

    /// Segments skipped after a bake failure, by stage.
    pub const SEGMENTS_SKIPPED_TOTAL: &str = "reel_segments_skipped_total";

    /// Progressive merge steps that failed and were skipped.
    pub const MERGE_STEPS_FAILED_TOTAL: &str = "reel_merge_steps_failed_total";

    /// Wall time of a full render in seconds, by mode.
    pub const RENDER_DURATION_SECONDS: &str = "reel_render_duration_seconds";
}

pub fn record_segment_baked() {
    counter!(names::SEGMENTS_BAKED_TOTAL).increment(1);
}

pub fn record_segment_skipped(stage: &'static str) {
    counter!(names::SEGMENTS_SKIPPED_TOTAL, "stage" => stage).increment(1);
}

pub fn record_merge_step_failed() {
    counter!(names::MERGE_STEPS_FAILED_TOTAL).increment(1);
}

pub fn record_render_duration(preview: bool, seconds: f64) {
    let mode = if preview { "preview" } else { "full" };
    histogram!(names::RENDER_DURATION_SECONDS, "mode" => mode).record(seconds);
}
