//! Task state records seen by API callers.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use reel_models::{TaskId, TaskSnapshot, TaskUpdate};

use crate::error::WorkerResult;

/// Where the worker publishes task state, progress and outputs.
#[async_trait]
pub trait TaskStateStore: Send + Sync {
    /// Merge `update` into the task's record, creating it if needed.
    async fn update(&self, task_id: &TaskId, update: TaskUpdate) -> WorkerResult<()>;

    async fn get(&self, task_id: &TaskId) -> WorkerResult<Option<TaskSnapshot>>;
}

/// Task records held in memory.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, TaskSnapshot>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStateStore for InMemoryTaskStore {
    async fn update(&self, task_id: &TaskId, update: TaskUpdate) -> WorkerResult<()> {
        let mut tasks = self.tasks.write().await;
        let snapshot = tasks
            .entry(task_id.clone())
            .or_insert_with(|| TaskSnapshot::new(task_id.clone()));
        snapshot.apply(update);
        debug!(
            task_id = %task_id,
            state = %snapshot.state,
            progress = snapshot.progress,
            "Task updated"
        );
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> WorkerResult<Option<TaskSnapshot>> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }
}
