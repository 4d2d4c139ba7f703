//! In-process queue for single-node runs and tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;
use crate::queue::TaskQueue;

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    ready: VecDeque<(String, QueueJob)>,
    pending: HashMap<String, QueueJob>,
    seen_keys: HashSet<String>,
    dead: Vec<(QueueJob, String)>,
}

/// Queue held in memory. Jobs are lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs parked in the dead letter list with their errors.
    pub async fn dead_letters(&self) -> Vec<(QueueJob, String)> {
        self.state.lock().await.dead.clone()
    }

    /// Jobs consumed but not yet acknowledged.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    async fn take(&self, count: usize) -> Vec<(String, QueueJob)> {
        let mut state = self.state.lock().await;
        let n = count.min(state.ready.len());
        let taken: Vec<_> = state.ready.drain(..n).collect();
        for (id, job) in &taken {
            state.pending.insert(id.clone(), job.clone());
        }
        taken
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let key = job.idempotency_key();
        let id = {
            let mut state = self.state.lock().await;
            if !state.seen_keys.insert(key.clone()) {
                warn!(key = %key, "Duplicate job rejected");
                return Err(QueueError::Duplicate(key));
            }
            state.next_id += 1;
            let id = format!("{}-0", state.next_id);
            state.ready.push_back((id.clone(), job));
            id
        };
        self.notify.notify_one();
        debug!(message_id = %id, "Enqueued job");
        Ok(id)
    }

    async fn consume(
        &self,
        _consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let jobs = self.take(count).await;
        if !jobs.is_empty() || block_ms == 0 {
            return Ok(jobs);
        }
        let _ = tokio::time::timeout(Duration::from_millis(block_ms), self.notify.notified()).await;
        Ok(self.take(count).await)
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        self.state
            .lock()
            .await
            .pending
            .remove(message_id)
            .map(|_| ())
            .ok_or_else(|| QueueError::MessageNotFound(message_id.to_string()))
    }

    async fn dlq(&self, message_id: &str, job: &QueueJob, error: &str) -> QueueResult<()> {
        self.ack(message_id).await?;
        self.state
            .lock()
            .await
            .dead
            .push((job.clone(), error.to_string()));
        warn!(job_id = job.job_id(), error, "Moved job to DLQ");
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let state = self.state.lock().await;
        Ok((state.ready.len() + state.pending.len()) as u64)
    }
}
