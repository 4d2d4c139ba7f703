//! Job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use reel_queue::{QueueJob, TaskQueue};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::{process_job, ProcessingContext};
use crate::retry::RetryConfig;

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<dyn TaskQueue>,
    ctx: Arc<ProcessingContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: Arc<dyn TaskQueue>, ctx: ProcessingContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue,
            ctx: Arc::new(ctx),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Consume jobs until [`shutdown`](Self::shutdown) is called, then wait
    /// for in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_jobs = self.config.max_concurrent_jobs,
            "Starting job executor"
        );
        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!(error = %e, "Error consuming jobs");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("In-flight jobs still running at shutdown timeout");
        }
        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and spawn up to as many jobs as there are free slots.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, self.config.consume_block_ms, available)
            .await?;
        if jobs.is_empty() {
            return Ok(());
        }
        debug!(count = jobs.len(), "Consumed jobs from queue");

        for (message_id, job) in jobs {
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let config = self.config.clone();

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(&config, &ctx, queue.as_ref(), &message_id, &job).await;
            });
        }
        Ok(())
    }

    /// Run a job with timeout and retries, then ack it or park it in the DLQ.
    pub async fn execute_job(
        config: &WorkerConfig,
        ctx: &ProcessingContext,
        queue: &dyn TaskQueue,
        message_id: &str,
        job: &QueueJob,
    ) {
        let job_id = job.job_id();
        let started = Instant::now();
        let retry = RetryConfig::default().with_max_retries(config.max_retries);
        let mut attempt = 0;

        let outcome = loop {
            info!(job_id, task_id = %job.task_id(), kind = job.kind(), attempt, "Executing job");
            let result = match tokio::time::timeout(config.job_timeout, process_job(ctx, job)).await {
                Ok(result) => result,
                Err(_) => Err(WorkerError::Timeout(config.job_timeout.as_secs())),
            };
            match result {
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    match retry.delay_for_attempt(attempt) {
                        Some(delay) => {
                            warn!(job_id, error = %e, attempt, ?delay, "Job failed, retrying");
                            tokio::time::sleep(delay).await;
                        }
                        None => break Err(e),
                    }
                }
                other => break other,
            }
        };

        let status = if outcome.is_ok() { "completed" } else { "failed" };
        counter!("reel_jobs_total", "kind" => job.kind(), "status" => status).increment(1);
        histogram!("reel_job_duration_seconds", "kind" => job.kind())
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                info!(job_id, "Job completed successfully");
                if let Err(e) = queue.ack(message_id).await {
                    error!(job_id, error = %e, "Failed to ack job");
                }
            }
            Err(e) => {
                let message = e.to_string();
                if e.is_input_error() {
                    warn!(job_id, error = %message, "Job rejected");
                } else {
                    error!(job_id, error = %message, "Job failed");
                }
                if let Err(store_err) = ctx.fail_task(job, &message).await {
                    error!(job_id, error = %store_err, "Failed to mark task failed");
                }
                if let Err(dlq_err) = queue.dlq(message_id, job, &message).await {
                    error!(job_id, error = %dlq_err, "Failed to move job to DLQ");
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
