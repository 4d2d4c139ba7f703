//! Shared data models for the reel composition engine.
//!
//! This crate provides Serde-serializable types for:
//! - Segment timelines (`segments.json`)
//! - Render parameters and encoding configuration
//! - Task identity and state records
//! - Subtitle timestamps

pub mod encoding;
pub mod params;
pub mod segment;
pub mod task;
pub mod timestamp;

// Re-export common types
pub use encoding::EncodingConfig;
pub use params::{
    BgmType, ConcatMode, RenderParams, SubtitlePosition, TextBackground, VideoAspect,
};
pub use segment::{
    total_duration, validate_timeline, FitMode, SegmentDescriptor, SegmentError, SlideDirection,
    TransitionMode, MIN_WINDOW_SECS,
};
pub use task::{TaskId, TaskSnapshot, TaskState, TaskUpdate};
pub use timestamp::{format_srt_timestamp, parse_timestamp, TimestampError};
