//! Job dispatch.

use std::sync::Arc;
use tracing::Instrument;

use reel_media::Engine;
use reel_models::TaskUpdate;
use reel_queue::QueueJob;

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::plan_job::run_plan;
use crate::render_job::run_render;
use crate::state::TaskStateStore;

/// Shared dependencies of job handlers.
#[derive(Clone)]
pub struct ProcessingContext {
    pub engine: Engine,
    pub store: Arc<dyn TaskStateStore>,
}

impl ProcessingContext {
    pub fn new(engine: Engine, store: Arc<dyn TaskStateStore>) -> Self {
        Self { engine, store }
    }

    /// Mark the job's task failed with `message`.
    pub async fn fail_task(&self, job: &QueueJob, message: &str) -> WorkerResult<()> {
        self.store
            .update(job.task_id(), TaskUpdate::failed(message))
            .await
    }
}

/// Run one job to completion.
pub async fn process_job(ctx: &ProcessingContext, job: &QueueJob) -> WorkerResult<()> {
    let logger = JobLogger::new(job.task_id(), job.job_id(), job.kind());
    let span = logger.create_span();
    async {
        match job {
            QueueJob::Plan(j) => run_plan(ctx, j, &logger).await.map(|_| ()),
            QueueJob::Render(j) => run_render(ctx, j, &logger).await.map(|_| ()),
        }
    }
    .instrument(span)
    .await
}
