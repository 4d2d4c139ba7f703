//! Render job: bake, merge and mux a task's timeline.

use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::warn;

use reel_media::{EngineError, RenderRequest, RenderStage, RenderedOutput, TaskPaths};
use reel_models::{total_duration, validate_timeline, SegmentDescriptor, TaskState, TaskUpdate};
use reel_queue::RenderJob;

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::processor::ProcessingContext;

/// Engine request for `job`. A single-segment timeline always renders as a
/// preview labelled with that segment's id.
pub fn build_request(job: &RenderJob, segments: Vec<SegmentDescriptor>) -> RenderRequest {
    let mut request = RenderRequest::new(job.task_id.clone(), segments, job.params.clone());
    if let Some(narration) = &job.narration {
        request = request.with_narration(narration);
    }
    if let Some(subtitles) = &job.subtitles {
        request = request.with_subtitles(subtitles);
    }
    if job.preview {
        request = request.as_preview(job.preview_label.clone());
    }
    if let [only] = request.segments.as_slice() {
        let label = only.segment_id.clone();
        request = request.as_preview(Some(label));
    }
    request
}

/// Replace entries of `saved` by the `edited` entries with the same id.
/// Returns how many were replaced.
pub fn replace_by_id(saved: &mut [SegmentDescriptor], edited: &[SegmentDescriptor]) -> usize {
    let mut replaced = 0;
    for entry in saved.iter_mut() {
        if let Some(edit) = edited.iter().find(|e| e.segment_id == entry.segment_id) {
            *entry = edit.clone();
            replaced += 1;
        }
    }
    replaced
}

/// Persist a caller-edited timeline before it is rendered. A full render
/// replaces the saved timeline; a preview only replaces the saved entries it
/// names. `None` when nothing was saved.
async fn save_edit(
    ctx: &ProcessingContext,
    request: &RenderRequest,
) -> WorkerResult<Option<Vec<SegmentDescriptor>>> {
    let edited = validate_timeline(request.segments.clone()).map_err(EngineError::from)?;
    let timeline = if request.preview {
        let mut saved = ctx.engine.load_segments(&request.task_id).await?;
        if replace_by_id(&mut saved, &edited) == 0 {
            return Ok(None);
        }
        validate_timeline(saved).map_err(EngineError::from)?
    } else {
        edited
    };
    ctx.engine.save_segments(&request.task_id, &timeline).await?;
    Ok(Some(timeline))
}

async fn existing(path: PathBuf) -> Option<PathBuf> {
    match tokio::fs::try_exists(&path).await {
        Ok(true) => Some(path),
        _ => None,
    }
}

/// Fill unset narration and subtitles from the task directory's
/// `audio.mp3` and `subtitle.srt`.
async fn fill_task_inputs(paths: &TaskPaths, request: &mut RenderRequest) {
    if request.narration.is_none() {
        request.narration = existing(paths.narration_audio()).await;
    }
    if request.subtitles.is_none() {
        request.subtitles = existing(paths.subtitle_file()).await;
    }
}

pub async fn run_render(
    ctx: &ProcessingContext,
    job: &RenderJob,
    logger: &JobLogger,
) -> WorkerResult<RenderedOutput> {
    let edited = job.segments.is_some();
    let segments = match &job.segments {
        Some(segments) => segments.clone(),
        None => ctx.engine.load_segments(&job.task_id).await?,
    };
    let mut request = build_request(job, segments);
    fill_task_inputs(&ctx.engine.task_paths(&job.task_id)?, &mut request).await;
    logger.log_start(&format!(
        "{} segments, preview={}",
        request.segments.len(),
        request.preview
    ));

    let mut update = TaskUpdate::state(TaskState::Processing).progress(5);
    if edited {
        if let Some(timeline) = save_edit(ctx, &request).await? {
            logger.log_progress(&format!("saved edited timeline of {} segments", timeline.len()));
            update.audio_duration = Some(total_duration(&timeline));
            update.segments = Some(timeline);
        }
    }
    ctx.store.update(&job.task_id, update).await?;

    // Engine progress is reported synchronously; forward it to the store.
    let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
    let store = ctx.store.clone();
    let task_id = job.task_id.clone();
    let forwarder = tokio::spawn(async move {
        let mut last = 0u8;
        while let Some(percent) = rx.recv().await {
            if percent > last && percent < 100 {
                last = percent;
                if let Err(e) = store.update(&task_id, TaskUpdate::default().progress(percent)).await {
                    warn!(task_id = %task_id, error = %e, "Failed to publish render progress");
                }
            }
        }
    });

    let sink = move |_stage: RenderStage, percent: u8| {
        tx.send(percent).ok();
    };
    let result = ctx.engine.render(request, &sink).await;
    drop(sink);
    if let Err(e) = forwarder.await {
        warn!(task_id = %job.task_id, error = %e, "Progress forwarder stopped abnormally");
    }
    let output = result?;

    let mut update = TaskUpdate::state(TaskState::Completed).progress(100);
    update.combined_videos = Some(vec![output.combined.display().to_string()]);
    update.videos = Some(
        output
            .final_path
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
    );
    ctx.store.update(&job.task_id, update).await?;

    logger.log_completion(&format!(
        "{} baked, {} skipped, output {}",
        output.baked,
        output.skipped,
        output
            .final_path
            .as_ref()
            .unwrap_or(&output.combined)
            .display()
    ));
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{RenderParams, TaskId};

    fn segment(id: &str, order: u32) -> SegmentDescriptor {
        SegmentDescriptor::new(id, order, "/m/a.mp4", 0.0, 2.0)
    }

    #[test]
    fn test_single_segment_forces_preview() {
        let job = RenderJob::new(TaskId::from("t1"), RenderParams::default()).with_narration("/a.mp3");
        let request = build_request(&job, vec![segment("seg-1-aa", 1)]);
        assert!(request.preview);
        assert_eq!(request.preview_label.as_deref(), Some("seg-1-aa"));
    }

    #[test]
    fn test_multi_segment_keeps_mode() {
        let job = RenderJob::new(TaskId::from("t1"), RenderParams::default()).with_narration("/a.mp3");
        let request = build_request(&job, vec![segment("a", 1), segment("b", 2)]);
        assert!(!request.preview);
        assert_eq!(request.narration.as_deref(), Some(std::path::Path::new("/a.mp3")));

        let job = job.as_preview(Some("draft".into()));
        let request = build_request(&job, vec![segment("a", 1), segment("b", 2)]);
        assert_eq!(request.preview_label.as_deref(), Some("draft"));
    }

    #[test]
    fn test_replace_by_id_keeps_unnamed_entries() {
        let mut saved = vec![segment("a", 1), segment("b", 2), segment("c", 3)];
        let edit = segment("b", 2).with_speed(1.25);
        let replaced = replace_by_id(&mut saved, &[edit.clone(), segment("zz", 9)]);
        assert_eq!(replaced, 1);
        assert_eq!(saved[1], edit);
        assert_eq!(saved[0].segment_id, "a");
        assert_eq!(saved.len(), 3);
    }
}
