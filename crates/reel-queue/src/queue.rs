//! Job queue using Redis Streams.

use async_trait::async_trait;
use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Max retries before DLQ
    pub max_retries: u32,
    /// How long an enqueued job's idempotency key is remembered
    pub dedup_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "reel:jobs".to_string(),
            consumer_group: "reel:workers".to_string(),
            dlq_stream_name: "reel:dlq".to_string(),
            max_retries: 3,
            dedup_ttl: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            dedup_ttl: Duration::from_secs(
                std::env::var("QUEUE_DEDUP_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.dedup_ttl.as_secs()),
            ),
        }
    }
}

/// Admission queue for plan and render jobs.
///
/// Consumed jobs stay pending until acknowledged or moved to the dead letter
/// queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Prepare the backing store. Idempotent.
    async fn init(&self) -> QueueResult<()> {
        Ok(())
    }

    /// Add a job; returns its message ID. Duplicate jobs are rejected.
    async fn enqueue(&self, job: QueueJob) -> QueueResult<String>;

    /// Take up to `count` new jobs, waiting at most `block_ms` for the first.
    async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>>;

    /// Mark a job finished.
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Park a failed job with its error and acknowledge the original.
    async fn dlq(&self, message_id: &str, job: &QueueJob, error: &str) -> QueueResult<()>;

    /// Jobs waiting or pending.
    async fn len(&self) -> QueueResult<u64>;

    async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Redis Streams queue with a consumer group.
pub struct RedisTaskQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisTaskQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    fn dedup_key(job: &QueueJob) -> String {
        format!("reel:dedup:{}", job.idempotency_key())
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!(group = %self.config.consumer_group, "Created consumer group"),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(group = %self.config.consumer_group, "Consumer group already exists");
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }
        Ok(())
    }

    async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&job)?;
        let key = job.idempotency_key();

        // SET NX doubles as the duplicate check
        let fresh: bool = redis::cmd("SET")
            .arg(Self::dedup_key(&job))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs())
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !fresh {
            warn!(key = %key, "Duplicate job rejected");
            return Err(QueueError::Duplicate(key));
        }

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&key)
            .query_async(&mut conn)
            .await?;

        info!(
            job_id = job.job_id(),
            task_id = %job.task_id(),
            kind = job.kind(),
            message_id = %message_id,
            "Enqueued job"
        );
        Ok(message_id)
    }

    async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();
                let Some(redis::Value::BulkString(payload)) = entry.map.get("job") else {
                    continue;
                };
                match serde_json::from_slice::<QueueJob>(payload) {
                    Ok(job) => {
                        debug!(job_id = job.job_id(), "Consumed job from stream");
                        jobs.push((message_id, job));
                    }
                    Err(e) => {
                        warn!(message_id = %message_id, error = %e, "Dropping malformed job payload");
                        self.ack(&message_id).await.ok();
                    }
                }
            }
        }
        Ok(jobs)
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(message_id, "Acknowledged job");
        Ok(())
    }

    async fn dlq(&self, message_id: &str, job: &QueueJob, error: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;
        self.ack(message_id).await?;

        warn!(job_id = job.job_id(), error, "Moved job to DLQ");
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "reel:jobs");
        assert_eq!(config.consumer_group, "reel:workers");
        assert_eq!(config.dedup_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_client_rejects_bad_url() {
        let config = QueueConfig {
            redis_url: "not a url".into(),
            ..QueueConfig::default()
        };
        assert!(RedisTaskQueue::new(config).is_err());
    }
}
