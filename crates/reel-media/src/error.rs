//! Error types for media and engine operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Result type for engine entry points.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from the FFmpeg/FFprobe layer and local media helpers.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Invalid clip graph: {0}")]
    InvalidGraph(String),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid subtitle file: {0}")]
    Subtitle(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_graph(message: impl Into<String>) -> Self {
        Self::InvalidGraph(message.into())
    }

    pub fn font(message: impl Into<String>) -> Self {
        Self::Font(message.into())
    }

    pub fn subtitle(message: impl Into<String>) -> Self {
        Self::Subtitle(message.into())
    }
}

/// Errors surfaced by the engine's public entry points.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No materials found")]
    NoMaterials,

    #[error("Nothing rendered: {0}")]
    NothingRendered(String),

    #[error("Segment not found: {0}")]
    SegmentNotFound(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn nothing_rendered(message: impl Into<String>) -> Self {
        Self::NothingRendered(message.into())
    }

    /// Whether the failure is the caller's fault (bad request) rather than
    /// an engine or environment failure.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidInput(_) | EngineError::NoMaterials | EngineError::SegmentNotFound(_)
        )
    }
}

impl From<reel_models::SegmentError> for EngineError {
    fn from(err: reel_models::SegmentError) -> Self {
        EngineError::InvalidInput(err.to_string())
    }
}
