//! `segments.json` timeline persistence.

use serde_json::Value;
use tracing::debug;

use reel_models::{validate_timeline, SegmentDescriptor};

use crate::error::{EngineError, EngineResult};
use crate::fs_utils;
use crate::layout::TaskPaths;

/// Persist the timeline as a JSON array, replacing any previous one.
pub async fn save_segments(paths: &TaskPaths, segments: &[SegmentDescriptor]) -> EngineResult<()> {
    tokio::fs::create_dir_all(paths.root()).await?;
    let file = paths.segments_file();
    let staging = file.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(segments)?;
    tokio::fs::write(&staging, body).await?;
    fs_utils::move_file(&staging, &file).await?;
    debug!(path = %file.display(), count = segments.len(), "Saved timeline");
    Ok(())
}

/// Load and validate the persisted timeline, sorted by `order`.
///
/// A task without a timeline yields an empty list. Entries that do not
/// decode or validate are reported by their array index.
pub async fn load_segments(paths: &TaskPaths) -> EngineResult<Vec<SegmentDescriptor>> {
    let file = paths.segments_file();
    let raw = match tokio::fs::read(&file).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let entries: Vec<Value> = serde_json::from_slice(&raw).map_err(|e| {
        EngineError::invalid_input(format!("{}: not a segment array: {}", file.display(), e))
    })?;
    let segments = entries
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value::<SegmentDescriptor>(value).map_err(|e| {
                EngineError::invalid_input(format!("segment at index {}: {}", index, e))
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    Ok(validate_timeline(segments)?)
}
