//! Worker configuration.

use std::time::Duration;

use reel_media::EngineConfig;

/// Which queue implementation the worker consumes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    #[default]
    Redis,
    Memory,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Job timeout
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How long one consume call blocks waiting for jobs (ms)
    pub consume_block_ms: u64,
    /// Attempts for retryable failures, not counting the first run
    pub max_retries: u32,
    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
    pub queue_backend: QueueBackend,
    pub engine: EngineConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(3600), // 1 hour
            shutdown_timeout: Duration::from_secs(30),
            consume_block_ms: 1000,
            max_retries: 2,
            metrics_port: None,
            queue_backend: QueueBackend::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            consume_block_ms: std::env::var("WORKER_CONSUME_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.consume_block_ms),
            max_retries: std::env::var("WORKER_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
            queue_backend: match std::env::var("QUEUE_BACKEND").as_deref() {
                Ok("memory") => QueueBackend::Memory,
                _ => QueueBackend::Redis,
            },
            engine: EngineConfig::from_env(),
        }
    }
}
