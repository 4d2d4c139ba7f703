//! Structured job logging utilities.

use tracing::{error, info, warn, Span};

use reel_models::TaskId;

/// Job logger carrying the task, job and job kind on every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    task_id: String,
    job_id: String,
    operation: &'static str,
}

impl JobLogger {
    /// `operation` is the job kind (`plan`, `render`).
    pub fn new(task_id: &TaskId, job_id: &str, operation: &'static str) -> Self {
        Self {
            task_id: task_id.to_string(),
            job_id: job_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            job_id = %self.job_id,
            operation = self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            job_id = %self.job_id,
            operation = self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            job_id = %self.job_id,
            operation = self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            job_id = %self.job_id,
            operation = self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            job_id = %self.job_id,
            operation = self.operation,
            "Job completed: {}", message
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Span that engine logs inherit while the job runs.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            task_id = %self.task_id,
            job_id = %self.job_id,
            operation = self.operation
        )
    }
}
