#![deny(unreachable_patterns)]
//! Segment-based short-video composition over the FFmpeg CLI.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and probing
//! - A clip graph compiled into FFmpeg filtergraphs, with tracked decoder handles
//! - The planner, per-segment bake, progressive merge and final mux
//! - Segment thumbnails and `segments.json` persistence
//! - [`Engine`], the facade tying these together per task directory

pub mod audio;
pub mod backend;
pub mod bake;
pub mod clip;
pub mod command;
pub mod engine;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod graph;
pub mod layout;
pub mod merge;
pub mod metrics;
pub mod mux;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod reaper;
pub mod store;
pub mod subtitles;
pub mod text_wrap;
pub mod thumbnail;

pub use audio::{AudioMix, AudioTrack};
pub use backend::{EncodeRequest, FfmpegBackend, MediaBackend};
pub use bake::{BakeFailure, BakeStage, BakedClip, Baker, Transition};
pub use clip::{Clip, Layer};
pub use command::{FfmpegCommand, FfmpegRunner};
pub use engine::{Engine, EngineConfig, RenderRequest, RenderedOutput};
pub use error::{EngineError, EngineResult, MediaError, MediaResult};
pub use layout::{preview_tag, TaskPaths};
pub use merge::{MergeOutcome, ProgressiveMerge};
pub use mux::{MuxOutcome, MuxRequest, Muxer};
pub use probe::{probe_media, MediaInfo};
pub use progress::{NoProgress, ProgressSink, RenderStage};
pub use reaper::{HandleRegistry, Release, ReleaseReport, ScratchFile};
pub use subtitles::SubtitleItem;
pub use thumbnail::Thumbnailer;
