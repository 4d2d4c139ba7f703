//! Plan job: probe the narration, plan a timeline and publish it.

use std::path::{Path, PathBuf};

use reel_models::{total_duration, SegmentDescriptor, TaskState, TaskUpdate};
use reel_queue::PlanJob;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::processor::ProcessingContext;

/// Target length of the plan: the narration's duration, else the job's
/// explicit target, else zero (one pass over the materials).
async fn target_duration(ctx: &ProcessingContext, job: &PlanJob) -> WorkerResult<f64> {
    match (&job.narration, job.target_duration) {
        (Some(path), _) => Ok(ctx.engine.probe_duration(Path::new(path)).await?),
        (None, Some(seconds)) => Ok(seconds),
        (None, None) => Ok(0.0),
    }
}

pub async fn run_plan(
    ctx: &ProcessingContext,
    job: &PlanJob,
    logger: &JobLogger,
) -> WorkerResult<Vec<SegmentDescriptor>> {
    logger.log_start(&format!("{} materials", job.materials.len()));
    if job.materials.is_empty() {
        return Err(WorkerError::invalid_job("plan job lists no materials"));
    }
    ctx.store
        .update(&job.task_id, TaskUpdate::state(TaskState::Processing).progress(5))
        .await?;

    let target = target_duration(ctx, job).await?;
    logger.log_progress(&format!("target duration {:.3}s", target));

    let materials: Vec<PathBuf> = job.materials.iter().map(PathBuf::from).collect();
    let segments = ctx
        .engine
        .plan(
            &job.task_id,
            &materials,
            target,
            job.concat_mode,
            job.max_clip_duration,
        )
        .await?;

    let audio_duration = total_duration(&segments);
    ctx.store
        .update(
            &job.task_id,
            TaskUpdate {
                state: Some(TaskState::Completed),
                progress: Some(100),
                audio_duration: Some(audio_duration),
                segments: Some(segments.clone()),
                ..Default::default()
            },
        )
        .await?;

    match ctx.engine.ensure_thumbnails(&job.task_id).await {
        Ok(n) => logger.log_progress(&format!("{} thumbnails ready", n)),
        Err(e) => logger.log_warning(&format!("thumbnails skipped: {}", e)),
    }

    logger.log_completion(&format!(
        "{} segments, {:.3}s",
        segments.len(),
        audio_duration
    ));
    Ok(segments)
}
